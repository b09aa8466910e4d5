use anyhow::Result;
use config as config_loader;
use dotenvy::dotenv;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global config structure
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// RPC related config
#[derive(Debug, Deserialize, Clone)]
pub struct RpcConfig {
    /// Node endpoint, `ws(s)://` for a long-lived connection or `http(s)://`
    pub url: String,
    #[serde(default = "RpcConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RpcConfig {
    fn default_timeout_secs() -> u64 {
        45
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Block producer config
#[derive(Debug, Deserialize, Clone)]
pub struct ProducerConfig {
    #[serde(default = "ProducerConfig::default_chain_name")]
    pub chain_name: String,
    #[serde(default)]
    pub start_block: u64,
    /// Receipt fetch retries after the first attempt
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "ProducerConfig::default_block_polling_timeout_ms")]
    pub block_polling_timeout_ms: u64,
    /// Fetch blocks on a dedicated worker thread with its own connection
    #[serde(default)]
    pub use_worker: bool,
    /// Capacity of the downstream block channel
    #[serde(default = "ProducerConfig::default_sink_buffer")]
    pub sink_buffer: usize,
}

impl ProducerConfig {
    fn default_chain_name() -> String {
        "filecoin".to_string()
    }
    fn default_block_polling_timeout_ms() -> u64 {
        2000
    }
    fn default_sink_buffer() -> usize {
        64
    }

    pub fn block_polling_timeout(&self) -> Duration {
        Duration::from_millis(self.block_polling_timeout_ms)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            chain_name: Self::default_chain_name(),
            start_block: 0,
            max_retries: 0,
            block_polling_timeout_ms: Self::default_block_polling_timeout_ms(),
            use_worker: false,
            sink_buffer: Self::default_sink_buffer(),
        }
    }
}

/// RocksDB storage config
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_path")]
    pub path: String,
}

impl StorageConfig {
    fn default_path() -> String {
        "./data/producer".to_string()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

/// Logging config
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub to_file: bool,
    #[serde(default = "LoggingConfig::default_file_path")]
    pub file_path: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_file_path() -> String {
        "./logs/producer.log".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            to_file: false,
            file_path: Self::default_file_path(),
        }
    }
}

/// Metrics config
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "MetricsConfig::default_prometheus_exporter_port")]
    pub prometheus_exporter_port: u16,
}

impl MetricsConfig {
    fn default_prometheus_exporter_port() -> u16 {
        9100
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            prometheus_exporter_port: Self::default_prometheus_exporter_port(),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenv().ok(); // Load the .env file

        if !path.as_ref().exists() {
            anyhow::bail!("Config file not found: {:?}", path.as_ref());
        }

        let builder = config_loader::Config::builder()
            .add_source(config_loader::File::from(path.as_ref().to_path_buf()))
            .add_source(config_loader::Environment::with_prefix("PRODUCER").separator("__"))
            .build()?;

        let cfg = builder.try_deserialize::<AppConfig>()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc.url.trim().is_empty() {
            anyhow::bail!("rpc.url must not be empty");
        }
        if self.rpc.timeout_secs == 0 {
            anyhow::bail!("rpc.timeout_secs must be greater than 0");
        }
        if self.producer.chain_name.trim().is_empty() {
            anyhow::bail!("producer.chain_name must not be empty");
        }
        if self.producer.sink_buffer == 0 {
            anyhow::bail!("producer.sink_buffer must be greater than 0");
        }
        Ok(())
    }
}

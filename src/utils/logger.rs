use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber.
///
/// Lines carry the thread name so output from the block worker thread can be told
/// apart from the polling loop. `RUST_LOG` wins over the configured level.
pub fn init_logger(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stdout);

    let file_layer = if cfg.to_file {
        let path = Path::new(&cfg.file_path);
        let dir = path.parent().unwrap_or_else(|| Path::new("./logs"));
        let prefix = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("producer.log"));
        let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, prefix));
        // Dropping the guard loses buffered lines
        let _ = FILE_GUARD.set(guard);

        Some(
            fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(writer),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

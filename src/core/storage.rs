use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};

/// String-keyed store for producer bookkeeping, values are UTF-8 or JSON.
pub trait KVStorage: Send + Sync {
    fn init(&self) -> Result<()>;

    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn delete(&self, key: &str) -> Result<()>;

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

    /// Persist buffered writes, called once on shutdown.
    fn flush(&self) -> Result<()>;
}

use std::sync::Arc;

use anyhow::{Context, Result};
use rocksdb::{DB, Options};
use serde::{Serialize, de::DeserializeOwned};

use crate::core::storage::KVStorage;
use crate::storage::schema::{SCHEMA_VERSION, keys};

/// RocksDB-backed key/value store for producer bookkeeping.
///
/// Only small records live here (one produced-block marker per chain), so the
/// options favour durability over write throughput.
#[derive(Clone)]
pub struct RocksDBStorage {
    db: Arc<DB>,
}

impl RocksDBStorage {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_paranoid_checks(true);
        // Keep the WAL small, the marker is rewritten on every produced block
        opts.set_max_total_wal_size(64 * 1024 * 1024);
        opts.set_wal_bytes_per_sync(1024 * 1024);

        let db = DB::open(&opts, path)
            .with_context(|| format!("Failed to open RocksDB at path: {}", path))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KVStorage for RocksDBStorage {
    /// Stamp a fresh store with the schema version, refuse one written by a newer build.
    fn init(&self) -> Result<()> {
        match self.read(keys::SCHEMA_VERSION_KEY)? {
            Some(stored) => {
                let stored: u32 = stored
                    .parse()
                    .with_context(|| format!("Invalid schema version: {}", stored))?;
                if stored > SCHEMA_VERSION {
                    anyhow::bail!(
                        "Storage schema version {} is newer than supported version {}",
                        stored,
                        SCHEMA_VERSION
                    );
                }
                Ok(())
            }
            None => self.write(keys::SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_string()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .put(key.as_bytes(), value.as_bytes())
            .with_context(|| format!("Failed to write key: {}", key))
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(key.as_bytes())? {
            Some(value) => {
                let s = String::from_utf8(value)
                    .with_context(|| format!("Failed to parse value for key: {}", key))?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db
            .delete(key.as_bytes())
            .with_context(|| format!("Failed to delete key: {}", key))
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for key: {}", key))?;
        self.write(key, &json)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read(key)? {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("Failed to deserialize value for key: {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .with_context(|| "Failed to flush produced block marker to disk")
    }
}

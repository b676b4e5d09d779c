//! Persistence for access logs, threat reports and access patterns.
//!
//! Everything persisted goes through the small `KeyValueStore` trait so the
//! OS keychain can be swapped for an in-memory map in tests and demos.

pub mod keychain;
pub mod logs;

pub use keychain::KeychainStore;
pub use logs::{AccessLogEntry, LogStats, SecurityLevel, SecurityLog, ThreatReport};

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

/// Key under which access patterns are persisted.
pub const ACCESS_PATTERNS_KEY: &str = "nfc_access_patterns";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store operation failed: {0}")]
    Backend(String),
    #[error("Stored value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Byte-valued key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Idempotent: deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

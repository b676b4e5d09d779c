//! OS keychain-backed store.
//!
//! Uses the `keyring` crate; each key becomes a credential under one
//! service name and values are stored as binary secrets.

use keyring::Entry;

use super::{KeyValueStore, StoreError};

/// Default keychain service name.
pub const SERVICE_NAME: &str = "com.nfcguard.security";

impl From<keyring::Error> for StoreError {
    fn from(err: keyring::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct KeychainStore {
    service: String,
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeychainStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl KeyValueStore for KeychainStore {
    /// Returns `None` if no entry exists.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.entry(key)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::from(e)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entry(key)?.set_secret(value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted, idempotent
            Err(e) => Err(StoreError::from(e)),
        }
    }
}

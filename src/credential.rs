//! Credential store abstraction for device-salt/userId/rotation-timestamp
//! persistence under "unlocked-this-device-only" protection.
//!
//! Grounded in the same shape as the platform filesystem abstraction: the
//! real keystore is supplied by the embedding application; an in-memory
//! backend is provided for tests.

use crate::error::{VaultError, VaultResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Credential store key for the device salt (32 random bytes, Base64).
pub const KEY_DEVICE_SALT: &str = "ls_dsalt_v1";
/// Credential store key for the userId (UTF-8).
pub const KEY_USER_ID: &str = "ls_uid_v1";
/// Credential store key for the rotation timestamp (decimal ms).
pub const KEY_ROTATION_TIMESTAMP: &str = "ls_rts_v1";

/// String-keyed byte-blob credential store, standing in for a platform
/// keystore with "unlocked-this-device-only" access class semantics.
pub trait CredentialBackend: Send + Sync {
    /// Store `value` under `key`, overwriting any prior value.
    fn put(&self, key: &str, value: Vec<u8>) -> VaultResult<()>;
    /// Fetch the value stored under `key`, if any.
    fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>>;
    /// Delete the value stored under `key`. Not an error if absent.
    fn delete(&self, key: &str) -> VaultResult<()>;
}

/// In-memory credential backend for tests. Holds its entries behind an
/// `Arc<Mutex<_>>` so a test can clone a handle before boxing the backend
/// into a session and still observe or drive credential-store state (e.g.
/// simulating a kill-switch wipe) from outside.
#[derive(Default, Clone)]
pub struct MemoryCredentialBackend {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryCredentialBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryCredentialBackend {
    fn put(&self, key: &str, value: Vec<u8>) -> VaultResult<()> {
        self.entries
            .lock()
            .map_err(|_| VaultError::Credential("credential store lock poisoned".to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| VaultError::Credential("credential store lock poisoned".to_string()))?
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &str) -> VaultResult<()> {
        self.entries
            .lock()
            .map_err(|_| VaultError::Credential("credential store lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let backend = MemoryCredentialBackend::new();
        backend.put(KEY_DEVICE_SALT, vec![1, 2, 3]).unwrap();
        assert_eq!(backend.get(KEY_DEVICE_SALT).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_get_missing_is_none() {
        let backend = MemoryCredentialBackend::new();
        assert_eq!(backend.get(KEY_DEVICE_SALT).unwrap(), None);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let backend = MemoryCredentialBackend::new();
        backend.put(KEY_USER_ID, vec![9]).unwrap();
        backend.delete(KEY_USER_ID).unwrap();
        backend.delete(KEY_USER_ID).unwrap();
        assert_eq!(backend.get(KEY_USER_ID).unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let backend = MemoryCredentialBackend::new();
        backend.put(KEY_ROTATION_TIMESTAMP, vec![1]).unwrap();
        backend.put(KEY_ROTATION_TIMESTAMP, vec![2]).unwrap();
        assert_eq!(backend.get(KEY_ROTATION_TIMESTAMP).unwrap(), Some(vec![2]));
    }
}

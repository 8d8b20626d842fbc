//! Root Key Service: device-salt lifecycle and Root Secret derivation.

use crate::credential::{CredentialBackend, KEY_DEVICE_SALT, KEY_ROTATION_TIMESTAMP, KEY_USER_ID};
use crate::crypto::pbkdf2;
use crate::crypto::random;
use crate::error::{VaultError, VaultResult};
use crate::memory::SecretBuffer;
use sha2::{Digest, Sha256};

const DEVICE_SALT_LEN: usize = 32;
const ROOT_SECRET_ITERATIONS: u32 = 310_000;
const ROOT_SECRET_LEN: usize = 64;

/// Ensure the device salt exists in `store`, generating and persisting one
/// alongside `user_id` on first call. Idempotent.
pub fn init_device_salt(store: &dyn CredentialBackend, user_id: &str) -> VaultResult<()> {
    if store.get(KEY_DEVICE_SALT)?.is_none() {
        let salt = random::random_bytes(DEVICE_SALT_LEN)
            .map_err(|e| VaultError::Credential(e.to_string()))?;
        store.put(KEY_DEVICE_SALT, salt)?;
        store.put(KEY_USER_ID, user_id.as_bytes().to_vec())?;
    }
    Ok(())
}

/// Derive the Root Secret: 64 bytes via PBKDF2-SHA512(password =
/// sha256_hex(fingerprint) ∥ userId, salt = deviceSalt, iters = 310 000).
/// `user_id`, if given, wins over any userId on file.
pub fn derive_root_secret(
    store: &dyn CredentialBackend,
    fingerprint_hash: &str,
    user_id: Option<&str>,
) -> VaultResult<SecretBuffer> {
    let salt = store
        .get(KEY_DEVICE_SALT)?
        .ok_or(VaultError::SaltMissing)?;

    let resolved_user_id = match user_id {
        Some(u) => u.to_string(),
        None => {
            let stored = store.get(KEY_USER_ID)?.ok_or(VaultError::UserIdMissing)?;
            String::from_utf8(stored)
                .map_err(|_| VaultError::InvalidInput("stored userId is not UTF-8".to_string()))?
        }
    };

    let mut password = fingerprint_hash.as_bytes().to_vec();
    password.extend_from_slice(resolved_user_id.as_bytes());

    let root_bytes = pbkdf2::derive(&password, &salt, ROOT_SECRET_ITERATIONS, ROOT_SECRET_LEN)?;
    crate::memory::wipe_vec(&mut password);

    Ok(SecretBuffer::new(root_bytes))
}

/// Hash a raw fingerprint string the way the Root Key Service consumes it.
pub fn fingerprint_hash(raw_fingerprint: &str) -> String {
    hex::encode(Sha256::digest(raw_fingerprint.as_bytes()))
}

/// Delete the device salt, userId, and rotation-timestamp entries.
/// Best-effort: all three deletions are attempted regardless of individual
/// failures. Postcondition: the Root Secret is unrecoverable by design.
pub fn destroy_device_salt(store: &dyn CredentialBackend) {
    let _ = store.delete(KEY_DEVICE_SALT);
    let _ = store.delete(KEY_USER_ID);
    let _ = store.delete(KEY_ROTATION_TIMESTAMP);
}

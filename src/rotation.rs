//! Key Rotation Service: versioned AES-GCM envelope around a chapter's root
//! key, rotated on a schedule without touching fragment files.

use crate::crypto::aes_gcm::{self, AesKey};
use crate::crypto::hkdf;
use crate::error::{VaultError, VaultResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// Rotation interval: 7 days, in milliseconds.
pub const ROTATION_INTERVAL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// A versioned, wrapped chapter root key as persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WrappedChapterKey {
    /// Base64 of `IV ∥ AES-GCM-ciphertext(chapterRoot) ∥ tag`.
    pub wrapped_b64: String,
    /// Epoch milliseconds at which this envelope was produced.
    pub rotation_timestamp: u64,
    /// Envelope version, used to derive the wrapping key.
    pub version: u32,
}

/// True if no rotation timestamp is on record, or the interval has elapsed.
pub fn is_rotation_due(last_rotation_timestamp: Option<u64>, now_ms: u64) -> bool {
    match last_rotation_timestamp {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= ROTATION_INTERVAL_MS,
    }
}

fn wrapping_key(root: &[u8], chapter_id: &str, version: u32) -> VaultResult<AesKey> {
    let salt = format!("wrap:{}:{}", chapter_id, version);
    let key_bytes = hkdf::derive_key_with_salt(salt.as_bytes(), &[root], b"chapter-key-wrap", 32)?;
    let key = AesKey::from_bytes(&key_bytes)?;
    Ok(key)
}

/// Wrap `chapter_root` under a version-derived key. The wrapping key is
/// wiped immediately after use.
pub fn wrap_chapter_key(
    chapter_root: &[u8],
    root: &[u8],
    chapter_id: &str,
    version: u32,
    now_ms: u64,
) -> VaultResult<WrappedChapterKey> {
    let key = wrapping_key(root, chapter_id, version)?;
    let ciphertext = aes_gcm::encrypt_combined(&key, chapter_root, &[]).map_err(VaultError::from)?;
    Ok(WrappedChapterKey {
        wrapped_b64: BASE64.encode(&ciphertext),
        rotation_timestamp: now_ms,
        version,
    })
}

/// Unwrap a `WrappedChapterKey`, deriving the wrapping key from its
/// recorded version. A tag mismatch is treated as corruption or version
/// skew and reported as `UnwrapFail`.
pub fn unwrap_chapter_key(wrapped: &WrappedChapterKey, root: &[u8], chapter_id: &str) -> VaultResult<Vec<u8>> {
    let key = wrapping_key(root, chapter_id, wrapped.version)?;
    let ciphertext = BASE64
        .decode(&wrapped.wrapped_b64)
        .map_err(|_| VaultError::UnwrapFail)?;
    aes_gcm::decrypt_combined(&key, &ciphertext, &[]).map_err(|_| VaultError::UnwrapFail)
}

/// Unwrap then rewrap at `version + 1`. Fragment files are untouched; only
/// the envelope moves.
pub fn rotate(
    wrapped: &WrappedChapterKey,
    root: &[u8],
    chapter_id: &str,
    now_ms: u64,
) -> VaultResult<WrappedChapterKey> {
    let mut chapter_root = unwrap_chapter_key(wrapped, root, chapter_id)?;
    let result = wrap_chapter_key(&chapter_root, root, chapter_id, wrapped.version + 1, now_ms);
    crate::memory::wipe_vec(&mut chapter_root);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    #[test]
    fn test_rotation_due_when_missing() {
        assert!(is_rotation_due(None, 1_000_000));
    }

    #[test]
    fn test_rotation_not_due_within_interval() {
        assert!(!is_rotation_due(Some(0), 3 * DAY_MS));
    }

    #[test]
    fn test_rotation_due_at_boundary() {
        assert!(is_rotation_due(Some(0), ROTATION_INTERVAL_MS));
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let root = [0x11u8; 64];
        let chapter_root = vec![0xABu8; 32];
        let wrapped = wrap_chapter_key(&chapter_root, &root, "ch1", 1, 1000).unwrap();
        let unwrapped = unwrap_chapter_key(&wrapped, &root, "ch1").unwrap();
        assert_eq!(unwrapped, chapter_root);
    }

    #[test]
    fn test_rotate_bumps_version_and_preserves_key() {
        let root = [0x22u8; 64];
        let chapter_root = vec![0xCDu8; 32];
        let wrapped = wrap_chapter_key(&chapter_root, &root, "ch1", 1, 1000).unwrap();
        let rotated = rotate(&wrapped, &root, "ch1", 2000).unwrap();
        assert_eq!(rotated.version, 2);
        assert_eq!(rotated.rotation_timestamp, 2000);
        let unwrapped = unwrap_chapter_key(&rotated, &root, "ch1").unwrap();
        assert_eq!(unwrapped, chapter_root);
    }

    #[test]
    fn test_unwrap_wrong_chapter_id_fails() {
        let root = [0x33u8; 64];
        let chapter_root = vec![0xEFu8; 32];
        let wrapped = wrap_chapter_key(&chapter_root, &root, "ch1", 1, 1000).unwrap();
        let err = unwrap_chapter_key(&wrapped, &root, "ch2").unwrap_err();
        assert_eq!(err, VaultError::UnwrapFail);
    }

    #[test]
    fn test_unwrap_stale_version_fails() {
        let root = [0x44u8; 64];
        let chapter_root = vec![0x01u8; 32];
        let mut wrapped = wrap_chapter_key(&chapter_root, &root, "ch1", 1, 1000).unwrap();
        wrapped.version = 2;
        let err = unwrap_chapter_key(&wrapped, &root, "ch1").unwrap_err();
        assert_eq!(err, VaultError::UnwrapFail);
    }
}

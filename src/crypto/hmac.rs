// HMAC-SHA256, used for fragment integrity tags and backup-shard authentication.

use crate::crypto::constant_time::ConstantTimeMemory;
use ring::hmac;

/// Compute HMAC-SHA256 over `data` under `key`.
pub fn sign(key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data).as_ref().to_vec()
}

/// Verify an HMAC-SHA256 tag in constant time.
pub fn verify(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let expected = sign(key, data);
    bool::from(ConstantTimeMemory::ct_memcmp(&expected, tag))
}

/// Async wrapper over [`sign`], offloading to the blocking thread pool.
/// HMAC-SHA256 is cheap per call, but fragment ingestion signs many
/// fragments back-to-back and benefits from not blocking the reactor.
pub async fn sign_async(key: Vec<u8>, data: Vec<u8>) -> Vec<u8> {
    tokio::task::spawn_blocking(move || sign(&key, &data))
        .await
        .expect("hmac sign task panicked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_deterministic() {
        let key = [0x11u8; 32];
        let a = sign(&key, b"fragment-ciphertext");
        let b = sign(&key, b"fragment-ciphertext");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_verify_roundtrip() {
        let key = [0x22u8; 32];
        let tag = sign(&key, b"data");
        assert!(verify(&key, b"data", &tag));
    }

    #[test]
    fn test_verify_rejects_tampered_data() {
        let key = [0x22u8; 32];
        let tag = sign(&key, b"data");
        assert!(!verify(&key, b"tampered", &tag));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let key = [0x22u8; 32];
        let other_key = [0x33u8; 32];
        let tag = sign(&key, b"data");
        assert!(!verify(&other_key, b"data", &tag));
    }

    #[tokio::test]
    async fn test_sign_async_matches_sync() {
        let key = [0x44u8; 32];
        let sync = sign(&key, b"data");
        let async_out = sign_async(key.to_vec(), b"data".to_vec()).await;
        assert_eq!(sync, async_out);
    }
}

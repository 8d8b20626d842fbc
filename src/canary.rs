//! Canary Service: per-fragment sentinel bytes embedded in plaintext to
//! detect substitution even if AEAD authentication succeeds.

use crate::crypto::constant_time::ConstantTimeMemory;
use crate::crypto::hkdf;
use crate::error::{VaultError, VaultResult};

/// Length of the canary sentinel, in bytes.
pub const CANARY_LEN: usize = 16;
/// Length of the derivable padding that follows the canary.
pub const PAD_LEN: usize = 16;
/// Total overhead a canary embed appends to plaintext.
pub const OVERHEAD_LEN: usize = CANARY_LEN + PAD_LEN;

/// Derive the canary for `fragment_index`: `HKDF(chapterRoot, salt =
/// UTF-8("canary:" ∥ index), info = "canary-derive", L = 16)`.
pub fn derive(chapter_root: &[u8], fragment_index: u32) -> VaultResult<[u8; CANARY_LEN]> {
    let salt = format!("canary:{}", fragment_index);
    let derived = hkdf::derive_key_with_salt(salt.as_bytes(), &[chapter_root], b"canary-derive", CANARY_LEN)?;
    let mut canary = [0u8; CANARY_LEN];
    canary.copy_from_slice(&derived);
    Ok(canary)
}

/// Append `canary ∥ pad(16)` to `data`, where `pad[i] = canary[i mod 16]
/// XOR ((i+1) × 0x5A)`.
pub fn embed(data: &[u8], canary: &[u8; CANARY_LEN]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + OVERHEAD_LEN);
    out.extend_from_slice(data);
    out.extend_from_slice(canary);
    for i in 0..PAD_LEN {
        let factor = ((i as u8).wrapping_add(1)).wrapping_mul(0x5A);
        out.push(canary[i % CANARY_LEN] ^ factor);
    }
    out
}

/// Constant-time verify that the canary region of `blob` (the 32 bytes
/// preceding its end minus padding, i.e. bytes `[len-32, len-16)`) equals
/// `expected_canary`. The padding region is derivable and not checked.
pub fn verify(blob: &[u8], expected_canary: &[u8; CANARY_LEN]) -> VaultResult<()> {
    if blob.len() < OVERHEAD_LEN {
        return Err(VaultError::CanaryFail);
    }
    let canary_start = blob.len() - OVERHEAD_LEN;
    let canary_region = &blob[canary_start..canary_start + CANARY_LEN];
    if bool::from(ConstantTimeMemory::ct_memcmp(canary_region, expected_canary)) {
        Ok(())
    } else {
        Err(VaultError::CanaryFail)
    }
}

/// Strip the 32-byte canary+pad overhead, returning the original prefix.
pub fn strip(blob: &[u8]) -> VaultResult<Vec<u8>> {
    if blob.len() < OVERHEAD_LEN {
        return Err(VaultError::CanaryFail);
    }
    Ok(blob[..blob.len() - OVERHEAD_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_verify_strip_roundtrip() {
        let root = [0x11u8; 32];
        let canary = derive(&root, 0).unwrap();
        let data = b"fragment plaintext bytes";
        let blob = embed(data, &canary);
        assert!(verify(&blob, &canary).is_ok());
        assert_eq!(strip(&blob).unwrap(), data);
    }

    #[test]
    fn test_derive_deterministic_per_index() {
        let root = [0x22u8; 32];
        let a = derive(&root, 5).unwrap();
        let b = derive(&root, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_differs_per_index() {
        let root = [0x22u8; 32];
        let a = derive(&root, 0).unwrap();
        let b = derive(&root, 1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_fails_on_wrong_canary() {
        let root = [0x33u8; 32];
        let canary = derive(&root, 0).unwrap();
        let other = derive(&root, 1).unwrap();
        let blob = embed(b"data", &canary);
        assert!(verify(&blob, &other).is_err());
    }

    #[test]
    fn test_verify_rejects_too_short_blob() {
        let canary = [0u8; CANARY_LEN];
        assert!(verify(&[0u8; 10], &canary).is_err());
    }

    #[test]
    fn test_pad_is_derivable_from_canary() {
        let canary = [0xABu8; CANARY_LEN];
        let embedded = embed(b"x", &canary);
        let pad = &embedded[embedded.len() - PAD_LEN..];
        for i in 0..PAD_LEN {
            let factor = ((i as u8).wrapping_add(1)).wrapping_mul(0x5A);
            assert_eq!(pad[i], canary[i % CANARY_LEN] ^ factor);
        }
    }
}

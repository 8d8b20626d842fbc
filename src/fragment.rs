//! Fragment Engine: splits raw image bytes into fragments and drives the
//! per-fragment encrypt-then-MAC / verify-then-decrypt pipelines. Also
//! defines the Fragment Manifest persisted alongside a chapter's fragments.

use crate::canary;
use crate::crypto::aes_gcm::{self, AesKey};
use crate::crypto::constant_time::ConstantTimeMemory;
use crate::crypto::hmac;
use crate::crypto::random;
use crate::error::{VaultError, VaultResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// A contiguous slice of the source image, transient during ingest.
pub struct RawFragment {
    /// Position of this fragment within the image.
    pub index: u32,
    /// Fragment plaintext bytes.
    pub bytes: Vec<u8>,
}

/// Split `data` into fragments of random size drawn from
/// `[min_size, max_size)`, clamped by the remaining bytes for the tail.
/// A zero-length input produces zero fragments; input smaller than
/// `min_size` produces a single fragment.
pub fn split(data: &[u8], min_size: usize, max_size: usize) -> VaultResult<Vec<RawFragment>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if min_size == 0 || max_size <= min_size {
        return Err(VaultError::InvalidInput(
            "fragment size bounds must satisfy 0 < min < max".to_string(),
        ));
    }

    let mut fragments = Vec::new();
    let mut offset = 0usize;
    let mut index = 0u32;

    while offset < data.len() {
        let remaining = data.len() - offset;
        let take = if remaining <= max_size {
            remaining
        } else {
            let span = (max_size - min_size) as u64;
            min_size + random::random_range(span) as usize
        };
        let end = offset + take.min(remaining);
        fragments.push(RawFragment {
            index,
            bytes: data[offset..end].to_vec(),
        });
        offset = end;
        index += 1;
    }

    Ok(fragments)
}

/// A fragment after the encrypt-then-MAC pipeline, ready for storage.
pub struct EncryptedFragment {
    /// Fragment index.
    pub index: u32,
    /// `IV(12) ∥ AES-GCM-ciphertext ∥ tag(16)` (not yet Base64-encoded).
    pub encrypted_data: Vec<u8>,
    /// Base64 of the AAD used for this fragment (`imageId ":" index`).
    pub aad_b64: String,
    /// Hex-encoded HMAC-SHA256 over `encrypted_data`.
    pub hmac_hex: String,
    /// Plaintext size before encryption.
    pub original_size: usize,
}

fn fragment_aad(image_id: &str, index: u32) -> Vec<u8> {
    format!("{}:{}", image_id, index).into_bytes()
}

/// Encrypt one fragment under an explicit AES key (kept distinct from the
/// HMAC key so a single compromised key cannot forge both authentication
/// layers).
pub fn encrypt_fragment_with_key(
    chapter_root: &[u8],
    aes_key: &AesKey,
    hmac_key: &[u8],
    image_id: &str,
    fragment: &RawFragment,
) -> VaultResult<EncryptedFragment> {
    let canary_bytes = canary::derive(chapter_root, fragment.index)?;
    let mut embedded = canary::embed(&fragment.bytes, &canary_bytes);

    let aad = fragment_aad(image_id, fragment.index);
    let encrypted_data = aes_gcm::encrypt_combined(aes_key, &embedded, &aad).map_err(VaultError::from)?;
    crate::memory::wipe_vec(&mut embedded);

    let tag = hmac::sign(hmac_key, &encrypted_data);

    Ok(EncryptedFragment {
        index: fragment.index,
        encrypted_data,
        aad_b64: BASE64.encode(&aad),
        hmac_hex: hex::encode(tag),
        original_size: fragment.bytes.len(),
    })
}

/// Verify-then-decrypt one fragment, in the design's fail-fast order:
/// HMAC → AAD substitution check → AES-GCM auth → canary → strip.
pub fn decrypt_fragment(
    chapter_root: &[u8],
    aes_key: &AesKey,
    hmac_key: &[u8],
    image_id: &str,
    index: u32,
    encrypted_data: &[u8],
    stored_hmac_hex: &str,
    stored_aad_b64: &str,
) -> VaultResult<Vec<u8>> {
    let expected_hmac = hmac::sign(hmac_key, encrypted_data);
    let stored_hmac =
        hex::decode(stored_hmac_hex).map_err(|_| VaultError::InvalidInput("bad hmac hex".to_string()))?;
    if !bool::from(ConstantTimeMemory::ct_memcmp(&expected_hmac, &stored_hmac)) {
        return Err(VaultError::IntegrityFail);
    }

    let expected_aad = fragment_aad(image_id, index);
    let expected_aad_b64 = BASE64.encode(&expected_aad);
    if !bool::from(ConstantTimeMemory::ct_memcmp(
        expected_aad_b64.as_bytes(),
        stored_aad_b64.as_bytes(),
    )) {
        return Err(VaultError::SubstitutionFail);
    }

    let mut plaintext_with_canary = aes_gcm::decrypt_combined(aes_key, encrypted_data, &expected_aad)
        .map_err(|_| VaultError::AuthFail)?;

    let expected_canary = canary::derive(chapter_root, index)?;
    if let Err(e) = canary::verify(&plaintext_with_canary, &expected_canary) {
        crate::memory::wipe_vec(&mut plaintext_with_canary);
        return Err(e);
    }

    let plaintext = canary::strip(&plaintext_with_canary)?;
    crate::memory::wipe_vec(&mut plaintext_with_canary);
    Ok(plaintext)
}

/// One fragment's metadata within a `FragmentManifest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FragmentEntry {
    /// Fragment index.
    pub index: u32,
    /// On-disk filename for the fragment's ciphertext.
    pub filename: String,
    /// Hex-encoded HMAC-SHA256 over the encrypted blob.
    pub hmac_hex: String,
    /// Plaintext size before encryption.
    pub original_size: usize,
    /// Ciphertext size (before Base64 encoding).
    pub encrypted_size: usize,
}

/// Manifest for one image's fragments, persisted AES-GCM-encrypted under
/// the chapter's `fragmentMap` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FragmentManifest {
    /// Image identifier.
    pub image_id: String,
    /// Chapter identifier.
    pub chapter_id: String,
    /// Ingestion-scoped hex salt folded into every fragment filename.
    pub salt: String,
    /// Total number of fragments.
    pub total_fragments: usize,
    /// Total plaintext size across all fragments.
    pub total_size: usize,
    /// Per-fragment metadata, in index order.
    pub fragments: Vec<FragmentEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> (AesKey, Vec<u8>, [u8; 32]) {
        (AesKey::generate(), vec![0x11u8; 32], [0x22u8; 32])
    }

    #[test]
    fn test_split_empty() {
        assert!(split(&[], 50, 200).unwrap().is_empty());
    }

    #[test]
    fn test_split_smaller_than_min_is_single_fragment() {
        let data = vec![0xAAu8; 10];
        let frags = split(&data, 50, 200).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].bytes, data);
    }

    #[test]
    fn test_split_covers_all_bytes_contiguously() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let frags = split(&data, 50, 200).unwrap();
        let mut reassembled = Vec::new();
        for f in &frags {
            reassembled.extend_from_slice(&f.bytes);
        }
        assert_eq!(reassembled, data);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (aes_key, hmac_key, chapter_root) = keys();
        let raw = RawFragment {
            index: 0,
            bytes: b"fragment plaintext".to_vec(),
        };
        let enc =
            encrypt_fragment_with_key(&chapter_root, &aes_key, &hmac_key, "img1", &raw).unwrap();
        let dec = decrypt_fragment(
            &chapter_root,
            &aes_key,
            &hmac_key,
            "img1",
            0,
            &enc.encrypted_data,
            &enc.hmac_hex,
            &enc.aad_b64,
        )
        .unwrap();
        assert_eq!(dec, raw.bytes);
    }

    #[test]
    fn test_bit_flip_causes_integrity_or_auth_failure() {
        let (aes_key, hmac_key, chapter_root) = keys();
        let raw = RawFragment {
            index: 0,
            bytes: b"fragment plaintext".to_vec(),
        };
        let mut enc =
            encrypt_fragment_with_key(&chapter_root, &aes_key, &hmac_key, "img1", &raw).unwrap();
        enc.encrypted_data[5] ^= 0x01;
        let err = decrypt_fragment(
            &chapter_root,
            &aes_key,
            &hmac_key,
            "img1",
            0,
            &enc.encrypted_data,
            &enc.hmac_hex,
            &enc.aad_b64,
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::IntegrityFail | VaultError::AuthFail));
    }

    #[test]
    fn test_aad_swap_causes_substitution_fail_before_aes_call() {
        let (aes_key, hmac_key, chapter_root) = keys();
        let raw0 = RawFragment {
            index: 0,
            bytes: b"fragment zero".to_vec(),
        };
        let raw1 = RawFragment {
            index: 1,
            bytes: b"fragment one".to_vec(),
        };
        let enc0 =
            encrypt_fragment_with_key(&chapter_root, &aes_key, &hmac_key, "img1", &raw0).unwrap();
        let mut enc1 =
            encrypt_fragment_with_key(&chapter_root, &aes_key, &hmac_key, "img1", &raw1).unwrap();

        // Recompute HMAC over enc1's ciphertext but present enc0's AAD:
        // the HMAC still matches (it covers ciphertext only), so the
        // substitution surfaces at the AAD check, not the HMAC check.
        enc1.aad_b64 = enc0.aad_b64.clone();

        let err = decrypt_fragment(
            &chapter_root,
            &aes_key,
            &hmac_key,
            "img1",
            1,
            &enc1.encrypted_data,
            &enc1.hmac_hex,
            &enc1.aad_b64,
        )
        .unwrap_err();
        assert_eq!(err, VaultError::SubstitutionFail);
    }

    #[test]
    fn test_manifest_roundtrip_through_json() {
        let manifest = FragmentManifest {
            image_id: "img1".to_string(),
            chapter_id: "ch1".to_string(),
            salt: "abcd1234".to_string(),
            total_fragments: 1,
            total_size: 100,
            fragments: vec![FragmentEntry {
                index: 0,
                filename: "abc.dat".to_string(),
                hmac_hex: "deadbeef".to_string(),
                original_size: 100,
                encrypted_size: 132,
            }],
        };
        let json = serde_json::to_vec(&manifest).unwrap();
        let restored: FragmentManifest = serde_json::from_slice(&json).unwrap();
        assert_eq!(manifest, restored);
    }
}

// HKDF-SHA256 key derivation (RFC 5869)

use crate::crypto::{CryptoError, CryptoResult};
use hkdf::Hkdf;
use sha2::Sha256;

/// Derive a key from input key material with an empty salt.
///
/// RFC 5869 permits an absent salt (treated as a string of zeros of the
/// hash's output length); used where the design calls HKDF without a
/// separate salt input (e.g. deriving the Device Master Key from the
/// Root Secret).
pub fn derive_key(
    input_key_material: &[&[u8]],
    info: &[u8],
    output_length: usize,
) -> CryptoResult<Vec<u8>> {
    derive_key_with_optional_salt(None, input_key_material, info, output_length)
}

/// Derive a key from input key material with an explicit salt.
pub fn derive_key_with_salt(
    salt: &[u8],
    input_key_material: &[&[u8]],
    info: &[u8],
    output_length: usize,
) -> CryptoResult<Vec<u8>> {
    derive_key_with_optional_salt(Some(salt), input_key_material, info, output_length)
}

fn derive_key_with_optional_salt(
    salt: Option<&[u8]>,
    input_key_material: &[&[u8]],
    info: &[u8],
    output_length: usize,
) -> CryptoResult<Vec<u8>> {
    let mut ikm = Vec::new();
    for material in input_key_material {
        ikm.extend_from_slice(material);
    }

    let hkdf = Hkdf::<Sha256>::new(salt, &ikm);

    let mut output = vec![0u8; output_length];
    hkdf.expand(info, &mut output)
        .map_err(|e| CryptoError::InvalidInput(format!("HKDF expand failed: {}", e)))?;

    Ok(output)
}

/// Derive `key_count` independent keys of `key_length` bytes each from the
/// same input key material, distinguished by an index appended to `info_prefix`.
pub fn derive_multiple_keys(
    input_key_material: &[&[u8]],
    info_prefix: &[u8],
    key_count: usize,
    key_length: usize,
) -> CryptoResult<Vec<Vec<u8>>> {
    let mut keys = Vec::with_capacity(key_count);

    for i in 0..key_count {
        let mut info = info_prefix.to_vec();
        info.extend_from_slice(&(i as u32).to_be_bytes());

        let key = derive_key(input_key_material, &info, key_length)?;
        keys.push(key);
    }

    Ok(keys)
}

/// Async wrapper over [`derive_key_with_salt`], offloading the HKDF
/// expand to the blocking thread pool.
pub async fn derive_key_with_salt_async(
    salt: Vec<u8>,
    input_key_material: Vec<Vec<u8>>,
    info: Vec<u8>,
    output_length: usize,
) -> CryptoResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let refs: Vec<&[u8]> = input_key_material.iter().map(|v| v.as_slice()).collect();
        derive_key_with_salt(&salt, &refs, &info, output_length)
    })
    .await
    .map_err(|e| CryptoError::InvalidInput(e.to_string()))?
}

//! Display Mutation: a reversible keystream XOR over a decrypted fragment,
//! so buffered plaintext is never a valid image outside of render time.

use crate::crypto::hkdf;
use crate::error::VaultResult;

/// Derive a keystream of `length` bytes from the ephemeral key via
/// HKDF-Expand, and XOR it into `data` in place.
fn keystream(ephemeral_key: &[u8], length: usize) -> VaultResult<Vec<u8>> {
    if length == 0 {
        return Ok(Vec::new());
    }
    Ok(hkdf::derive_key_with_salt(&[], &[ephemeral_key], b"display-mutate", length)?)
}

/// Apply the mutation: `out = data XOR keystream(ephemeralKey, len(data))`.
pub fn apply(data: &[u8], ephemeral_key: &[u8]) -> VaultResult<Vec<u8>> {
    let stream = keystream(ephemeral_key, data.len())?;
    Ok(data.iter().zip(stream.iter()).map(|(a, b)| a ^ b).collect())
}

/// Reverse the mutation. Strict inverse of `apply` under the same key:
/// `reverse(apply(x, k), k) == x`.
pub fn reverse(mutated: &[u8], ephemeral_key: &[u8]) -> VaultResult<Vec<u8>> {
    apply(mutated, ephemeral_key)
}

// Cryptographically secure random number generation

use crate::crypto::{CryptoError, CryptoResult};
use rand::rngs::OsRng;
use rand::RngCore;

/// Maximum length accepted by `random_bytes`.
pub const MAX_RANDOM_LEN: usize = 4096;

/// Generate `length` cryptographically secure random bytes.
///
/// `length` must satisfy `1 <= length <= 4096`; callers needing an entropy
/// pool larger than that should make multiple calls.
pub fn random_bytes(length: usize) -> CryptoResult<Vec<u8>> {
    if length == 0 || length > MAX_RANDOM_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "random_bytes length must be in 1..={}, got {}",
            MAX_RANDOM_LEN, length
        )));
    }
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    Ok(bytes)
}

/// Generate a random u64.
pub fn random_u64() -> u64 {
    OsRng.next_u64()
}

/// Generate a random value in `[0, max)` via rejection sampling (no modulo bias).
pub fn random_range(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let range = u64::MAX - (u64::MAX % max);
    loop {
        let value = random_u64();
        if value < range {
            return value % max;
        }
    }
}

// PBKDF2-SHA512 password-based key derivation, used for Root Secret derivation.

use crate::crypto::{CryptoError, CryptoResult};
use ring::pbkdf2;
use std::num::NonZeroU32;

/// Derive `output_length` bytes from `password` and `salt` via
/// PBKDF2-HMAC-SHA512 with `iterations` rounds.
pub fn derive(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_length: usize,
) -> CryptoResult<Vec<u8>> {
    let iterations = NonZeroU32::new(iterations)
        .ok_or_else(|| CryptoError::InvalidInput("iterations must be nonzero".to_string()))?;

    let mut output = vec![0u8; output_length];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA512,
        iterations,
        salt,
        password,
        &mut output,
    );
    Ok(output)
}

/// Async wrapper over [`derive`]: offloads the blocking PBKDF2 computation
/// to the blocking thread pool, the suspending boundary expensive
/// primitives are required to cross.
pub async fn derive_async(
    password: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
    output_length: usize,
) -> CryptoResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || derive(&password, &salt, iterations, output_length))
        .await
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        let a = derive(b"password", b"salt", 1_000, 64).unwrap();
        let b = derive(b"password", b"salt", 1_000, 64).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_different_salt_different_output() {
        let a = derive(b"password", b"salt1", 1_000, 64).unwrap();
        let b = derive(b"password", b"salt2", 1_000, 64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_password_different_output() {
        let a = derive(b"password1", b"salt", 1_000, 64).unwrap();
        let b = derive(b"password2", b"salt", 1_000, 64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_zero_iterations() {
        assert!(derive(b"password", b"salt", 0, 64).is_err());
    }

    #[test]
    fn test_production_iteration_count() {
        // Sanity check at the design's iteration count, kept low enough
        // for a fast test run.
        let out = derive(b"password", b"salt", 310_000, 64).unwrap();
        assert_eq!(out.len(), 64);
    }

    #[tokio::test]
    async fn test_derive_async_matches_sync() {
        let sync = derive(b"password", b"salt", 1_000, 64).unwrap();
        let async_out = derive_async(b"password".to_vec(), b"salt".to_vec(), 1_000, 64)
            .await
            .unwrap();
        assert_eq!(sync, async_out);
    }
}

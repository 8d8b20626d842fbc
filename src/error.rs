// Vault error types

use std::error::Error;
use std::fmt;

/// Top-level vault error. Carries the error kinds named by the design's
/// error-handling policy; never carries key material or plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// HMAC over a fragment's ciphertext did not match (§4.8 step 1).
    IntegrityFail,

    /// AES-GCM authentication tag mismatch.
    AuthFail,

    /// Stored AAD did not match the expected `imageId:index` (§4.8 step 2).
    SubstitutionFail,

    /// Canary sentinel inside decrypted plaintext did not verify (§4.8 step 4).
    CanaryFail,

    /// Unwrapping a `WrappedChapterKey` failed (corruption or version skew).
    UnwrapFail,

    /// The Virtual Decryptor program did not reach `DISPLAY_MUTATE`.
    ProgramIncomplete,

    /// The device salt entry is missing from the credential store.
    SaltMissing,

    /// No userId was supplied and none is on file.
    UserIdMissing,

    /// Boot or periodic environment checks found the device rooted, emulated,
    /// debugged, or live-instrumented.
    EnvironmentUnsafe(String),

    /// A precondition of the Virtual Decryptor program was violated (e.g.
    /// attempted execution of an already-poisoned program).
    ProgramPreconditionViolated(String),

    /// A security violation was already handled; this is the terminal error
    /// the reentrancy-guarded violation handler returns on every invocation.
    SecurityViolation(String),

    /// Input validation failure that does not fit a more specific kind.
    InvalidInput(String),

    /// Storage backend I/O failure.
    Storage(String),

    /// Credential-store backend failure.
    Credential(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::IntegrityFail => write!(f, "fragment integrity check failed (HMAC mismatch)"),
            VaultError::AuthFail => write!(f, "AES-GCM authentication failed"),
            VaultError::SubstitutionFail => write!(f, "fragment AAD does not match expected identifier"),
            VaultError::CanaryFail => write!(f, "canary sentinel verification failed"),
            VaultError::UnwrapFail => write!(f, "chapter key unwrap failed"),
            VaultError::ProgramIncomplete => write!(f, "virtual decryptor program did not reach display mutation"),
            VaultError::SaltMissing => write!(f, "device salt is not present in the credential store"),
            VaultError::UserIdMissing => write!(f, "no userId supplied or on file"),
            VaultError::EnvironmentUnsafe(reason) => write!(f, "environment unsafe: {}", reason),
            VaultError::ProgramPreconditionViolated(reason) => {
                write!(f, "program precondition violated: {}", reason)
            }
            VaultError::SecurityViolation(reason) => write!(f, "security violation: {}", reason),
            VaultError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            VaultError::Storage(msg) => write!(f, "storage error: {}", msg),
            VaultError::Credential(msg) => write!(f, "credential store error: {}", msg),
        }
    }
}

impl Error for VaultError {}

impl From<crate::crypto::CryptoError> for VaultError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        match err {
            crate::crypto::CryptoError::DecryptionFailed(_) => VaultError::AuthFail,
            other => VaultError::InvalidInput(other.to_string()),
        }
    }
}

/// Vault result type.
pub type VaultResult<T> = Result<T, VaultError>;

/// Builds the `SECURITY_VIOLATION:<reason>:<epoch_ms>` identifier string from
/// §6, used as the payload of a terminal `VaultError::SecurityViolation`.
pub fn security_violation_identifier(reason: &str) -> String {
    format!("SECURITY_VIOLATION:{}:{}", reason, crate::time::current_time_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::IntegrityFail;
        assert_eq!(err.to_string(), "fragment integrity check failed (HMAC mismatch)");
    }

    #[test]
    fn test_error_conversion_from_crypto() {
        let crypto_err = crate::crypto::CryptoError::DecryptionFailed("Authentication failed".to_string());
        let vault_err: VaultError = crypto_err.into();
        assert_eq!(vault_err, VaultError::AuthFail);
    }

    #[test]
    fn test_violation_identifier_shape() {
        let id = security_violation_identifier("rooted");
        assert!(id.starts_with("SECURITY_VIOLATION:rooted:"));
    }
}

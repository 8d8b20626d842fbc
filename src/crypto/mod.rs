// Vault cryptographic core module

pub mod aes_gcm;
pub mod constant_time;
pub mod hkdf;
pub mod hmac;
pub mod pbkdf2;
pub mod random;

use std::error::Error;
use std::fmt;

/// Cryptographic error types
#[derive(Debug, Clone)]
pub enum CryptoError {
    KeyGenerationFailed(String),
    EncryptionFailed(String),
    DecryptionFailed(String),
    InvalidKeySize(String),
    InvalidInput(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyGenerationFailed(msg) => write!(f, "key generation failed: {}", msg),
            CryptoError::EncryptionFailed(msg) => write!(f, "encryption failed: {}", msg),
            CryptoError::DecryptionFailed(msg) => write!(f, "decryption failed: {}", msg),
            CryptoError::InvalidKeySize(msg) => write!(f, "invalid key size: {}", msg),
            CryptoError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl Error for CryptoError {}

pub type CryptoResult<T> = Result<T, CryptoError>;

//! leafsafe-vault: an on-device encrypted vault for paginated image
//! content, with fragment-level encrypt-then-MAC storage and a bounded
//! plaintext lifetime for decrypted pages.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod audit;
pub mod canary;
pub mod chapter_key;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod decryptor;
pub mod device;
pub mod display;
pub mod entropy;
pub mod ephemeral_key;
pub mod error;
pub mod fragment;
pub mod integrity;
pub mod memory;
pub mod orchestrator;
pub mod registry;
pub mod root_key;
pub mod rotation;
pub mod session;
pub mod storage;
pub mod time;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use session::{bootstrap, ChapterMetadata, VaultSession};

/// Crate version, re-exported for diagnostics and audit log entries.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

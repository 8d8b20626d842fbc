//! Vault configuration.
//!
//! Tunable constants named throughout the design, gathered into one struct
//! with a `Default` impl reproducing the literal values.

/// Vault-wide configuration. Passed into `bootstrap` and held by the session
/// for the process lifetime.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// PBKDF2-SHA512 iteration count for Root Secret derivation.
    pub pbkdf2_iterations: u32,
    /// Lower bound (inclusive) of a fragment's plaintext size, in bytes.
    pub fragment_min_size: usize,
    /// Upper bound (exclusive) of a fragment's plaintext size, in bytes.
    pub fragment_max_size: usize,
    /// Key rotation is due once this many milliseconds have elapsed since
    /// the last recorded rotation timestamp.
    pub rotation_interval_ms: u64,
    /// Maximum number of decrypted-then-mutated render buffers held at once.
    pub max_decrypted_fragments: usize,
    /// Last-resort deferred-wipe timer for a live buffer, in milliseconds.
    pub deferred_wipe_ms: u64,
    /// Minimum throttle interval between live-instrumentation checks, in milliseconds.
    pub live_instrumentation_interval_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            pbkdf2_iterations: 310_000,
            fragment_min_size: 50 * 1024,
            fragment_max_size: 200 * 1024,
            rotation_interval_ms: 7 * 24 * 60 * 60 * 1000,
            max_decrypted_fragments: 2,
            deferred_wipe_ms: 5_000,
            live_instrumentation_interval_ms: 8_000,
        }
    }
}

impl VaultConfig {
    /// Convenience constructor for overriding the PBKDF2 iteration count;
    /// all other fields keep their production defaults. Useful for lowering
    /// iterations in fast test environments.
    pub fn with_pbkdf2_iterations(iterations: u32) -> Self {
        VaultConfig {
            pbkdf2_iterations: iterations,
            ..VaultConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.pbkdf2_iterations, 310_000);
        assert_eq!(config.fragment_min_size, 50 * 1024);
        assert_eq!(config.fragment_max_size, 200 * 1024);
        assert_eq!(config.max_decrypted_fragments, 2);
        assert_eq!(config.rotation_interval_ms, 7 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn test_custom_iterations() {
        let config = VaultConfig::with_pbkdf2_iterations(100);
        assert_eq!(config.pbkdf2_iterations, 100);
        assert_eq!(config.fragment_min_size, VaultConfig::default().fragment_min_size);
    }
}

//! Ephemeral Key Service: per-render key derived from runtime entropy.
//! Drives Display Mutation only; never touches storage.

use crate::crypto::hkdf;
use crate::entropy::RuntimeEntropyBundle;
use crate::error::VaultResult;
use crate::memory::SecretBuffer;

/// Derive the Ephemeral Key: `HKDF(ikm = chapterRoot, salt =
/// serialize(entropy), info = "runtime-ephemeral", L = 32)`. The
/// serialization buffer is wiped before returning.
pub fn derive_ephemeral_key(
    chapter_root: &[u8],
    entropy: &RuntimeEntropyBundle,
) -> VaultResult<SecretBuffer> {
    let mut serialized = entropy.serialize();
    let key = hkdf::derive_key_with_salt(&serialized, &[chapter_root], b"runtime-ephemeral", 32);
    crate::memory::wipe_vec(&mut serialized);
    Ok(SecretBuffer::new(key?))
}

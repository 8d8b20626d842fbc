//! Runtime entropy bundle and provider: the per-render inputs to Ephemeral
//! Key derivation, plus the session-owned `memorySalt` that regenerates on
//! every foreground transition.

use crate::crypto::random;

/// Length of the memory salt field, in bytes.
pub const MEMORY_SALT_LEN: usize = 16;

/// `{bootTime_ms, frameCounter, scrollVelocity_μpx_per_ms, chunkIndex,
/// memorySalt}` — the runtime state folded into an Ephemeral Key.
#[derive(Debug, Clone)]
pub struct RuntimeEntropyBundle {
    /// Milliseconds since device boot.
    pub boot_time_ms: u64,
    /// Monotonically increasing render frame counter.
    pub frame_counter: u32,
    /// Scroll velocity in micro-pixels per millisecond.
    pub scroll_velocity_upx_per_ms: i64,
    /// Index of the chunk currently being read.
    pub chunk_index: i64,
    /// 16-byte salt regenerated every foreground transition.
    pub memory_salt: [u8; MEMORY_SALT_LEN],
}

impl RuntimeEntropyBundle {
    /// Serialize as `bootTime(u64-LE) ∥ frameCounter(i64-LE) ∥
    /// round(velocity×1000)(i64-LE) ∥ chunkIndex(i64-LE) ∥ memorySalt(16)`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * 4 + MEMORY_SALT_LEN);
        out.extend_from_slice(&self.boot_time_ms.to_le_bytes());
        out.extend_from_slice(&(self.frame_counter as i64).to_le_bytes());
        let scaled_velocity = self.scroll_velocity_upx_per_ms.saturating_mul(1000);
        out.extend_from_slice(&scaled_velocity.to_le_bytes());
        out.extend_from_slice(&self.chunk_index.to_le_bytes());
        out.extend_from_slice(&self.memory_salt);
        out
    }
}

/// Owns the session's `memorySalt` and frame/scroll bookkeeping across
/// foreground/background transitions.
pub struct EntropyProvider {
    memory_salt: [u8; MEMORY_SALT_LEN],
    frame_counter: u32,
    scroll_velocity_upx_per_ms: i64,
    boot_time_ms: u64,
}

impl EntropyProvider {
    /// Create a provider with a freshly generated memory salt and counters
    /// reset to zero.
    pub fn new(boot_time_ms: u64) -> crate::error::VaultResult<Self> {
        let mut provider = EntropyProvider {
            memory_salt: [0u8; MEMORY_SALT_LEN],
            frame_counter: 0,
            scroll_velocity_upx_per_ms: 0,
            boot_time_ms,
        };
        provider.regenerate()?;
        Ok(provider)
    }

    /// Regenerate the memory salt and reset counters. Called on every
    /// `active` transition.
    pub fn regenerate(&mut self) -> crate::error::VaultResult<()> {
        crate::memory::wipe(&mut self.memory_salt);
        let fresh = random::random_bytes(MEMORY_SALT_LEN)?;
        self.memory_salt.copy_from_slice(&fresh);
        self.frame_counter = 0;
        self.scroll_velocity_upx_per_ms = 0;
        Ok(())
    }

    /// Wipe the memory salt in place, without generating a replacement.
    /// Called on `background` transitions.
    pub fn wipe(&mut self) {
        crate::memory::wipe(&mut self.memory_salt);
    }

    /// Advance the frame counter by one.
    pub fn tick_frame(&mut self) {
        self.frame_counter = self.frame_counter.wrapping_add(1);
    }

    /// Record a new scroll velocity sample.
    pub fn set_scroll_velocity(&mut self, upx_per_ms: i64) {
        self.scroll_velocity_upx_per_ms = upx_per_ms;
    }

    /// Snapshot the current entropy state for one render call.
    pub fn snapshot(&self, chunk_index: i64) -> RuntimeEntropyBundle {
        RuntimeEntropyBundle {
            boot_time_ms: self.boot_time_ms,
            frame_counter: self.frame_counter,
            scroll_velocity_upx_per_ms: self.scroll_velocity_upx_per_ms,
            chunk_index,
            memory_salt: self.memory_salt,
        }
    }
}

//! Secret buffer and multi-pass memory wiping.
//!
//! A `SecretBuffer` is an owned, fixed-length byte buffer whose release path
//! unconditionally overwrites its contents before the memory is freed. Wipe
//! passes go zero, one-fill, random, repeated at least three times, ending
//! on an authoritative zero pass, matching the design's wipe-pass policy.

use crate::crypto::random;
use std::ptr;

fn volatile_fill(buf: &mut [u8], value: u8) {
    for byte in buf.iter_mut() {
        unsafe {
            ptr::write_volatile(byte, value);
        }
    }
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
}

/// Overwrite `buf` in place: 0x00 -> 0xFF -> random, repeated three times,
/// with a final authoritative 0x00 pass.
pub fn wipe(buf: &mut [u8]) {
    if buf.is_empty() {
        return;
    }
    for _ in 0..3 {
        volatile_fill(buf, 0x00);
        volatile_fill(buf, 0xFF);
        if let Ok(random_pass) = random::random_bytes(buf.len().min(random::MAX_RANDOM_LEN)) {
            for (b, r) in buf.iter_mut().zip(random_pass.iter().cycle()) {
                unsafe {
                    ptr::write_volatile(b, *r);
                }
            }
            std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
        }
    }
    volatile_fill(buf, 0x00);
}

/// Wipe a `Vec<u8>`'s contents, then clear it.
pub fn wipe_vec(v: &mut Vec<u8>) {
    wipe(v.as_mut_slice());
    v.clear();
}

/// An owned, fixed-length secret byte buffer. No alias of its contents ever
/// leaves this type; the only way to read the bytes is through `as_slice`.
/// The buffer is wiped on drop and can additionally be wiped early via
/// `release`.
pub struct SecretBuffer {
    data: Vec<u8>,
    released: bool,
}

impl SecretBuffer {
    /// Take ownership of `data` as a secret buffer.
    pub fn new(data: Vec<u8>) -> Self {
        SecretBuffer {
            data,
            released: false,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the contents. Panics if the buffer has already been released.
    pub fn as_slice(&self) -> &[u8] {
        assert!(!self.released, "use of a released SecretBuffer");
        &self.data
    }

    /// Wipe and release the buffer's contents now, ahead of `Drop`.
    pub fn release(&mut self) {
        if !self.released {
            wipe_vec(&mut self.data);
            self.released = true;
        }
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBuffer([REDACTED], len={})", self.data.len())
    }
}

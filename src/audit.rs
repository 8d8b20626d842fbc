//! Audit logging for production compliance
//!
//! Important events (ingestion, rotation, violation, lifecycle transitions)
//! are recorded for an audit trail without storing sensitive data.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash data for audit (privacy-preserving, no raw IDs in logs)
pub fn hash_for_audit(data: &[u8]) -> String {
    hex::encode(&Sha256::digest(data)[..8])
}

/// Audit event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AuditEvent {
    /// A chapter was ingested into the vault.
    ChapterIngested {
        /// Hash of the chapter ID.
        chapter_id_hash: String,
        /// Number of images ingested.
        image_count: usize,
    },
    /// A chapter key bundle was rotated.
    KeyRotation {
        /// Hash of the chapter ID.
        chapter_id_hash: String,
        /// Wrapped-key envelope version after rotation.
        new_version: u32,
    },
    /// A fragment failed integrity, authentication, substitution, or canary checks.
    FragmentVerificationFailed {
        /// Hash of the image ID.
        image_id_hash: String,
        /// Fragment index.
        fragment_index: u32,
        /// Failure reason (non-sensitive, never key material).
        reason: String,
    },
    /// The device salt was destroyed (kill switch invoked).
    DeviceSaltDestroyed,
    /// A security violation was detected and handled.
    ViolationDetected {
        /// Non-sensitive reason string.
        reason: String,
    },
    /// The vault transitioned to background/inactive.
    LifecycleBackground,
    /// The vault transitioned to active.
    LifecycleActive,
}

/// Single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Timestamp (Unix ms)
    pub timestamp_ms: u64,
    /// Event type
    pub event: AuditEvent,
    /// Optional context (non-sensitive)
    pub context: Option<String>,
}

impl AuditEntry {
    /// Create new audit entry, timestamped with the current time.
    pub fn new(event: AuditEvent, context: Option<String>) -> Self {
        Self {
            timestamp_ms: crate::time::current_time_millis(),
            event,
            context,
        }
    }
}

/// Audit logger backend (trait for pluggable sink)
pub trait AuditSink: Send + Sync {
    /// Log audit entry
    fn log(&self, entry: AuditEntry);
}

/// In-memory audit sink (for testing)
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: std::sync::Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Create new in-memory sink
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all logged entries
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Clear entries (testing only)
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn log(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

/// No-op sink (default when audit disabled)
#[derive(Debug, Default)]
pub struct NoOpAuditSink;

impl AuditSink for NoOpAuditSink {
    fn log(&self, _entry: AuditEntry) {}
}

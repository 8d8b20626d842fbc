//! Security Orchestrator & Lifecycle: the boot gate, the one-shot
//! reentrancy-guarded violation handler, and foreground/background
//! transitions.
//!
//! A library cannot unilaterally terminate its host process; the violation
//! handler's "abort" step is modeled as a terminal `VaultError::SecurityViolation`
//! carrying the `SECURITY_VIOLATION:<reason>:<epoch_ms>` identifier, which the
//! embedding application is expected to treat as fatal.

use crate::audit::{AuditEvent, AuditSink};
use crate::credential::CredentialBackend;
use crate::entropy::EntropyProvider;
use crate::error::{security_violation_identifier, VaultError, VaultResult};
use crate::integrity::{boot_gate, EnvironmentProbe, LiveInstrumentationDetector};
use crate::registry::LiveBufferRegistry;
use crate::root_key;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether the violation handler has already run. Set once and
/// never cleared: a violation is terminal for the process lifetime.
pub struct SecurityOrchestrator {
    violated: AtomicBool,
}

impl SecurityOrchestrator {
    /// Construct a fresh orchestrator, not yet violated.
    pub fn new() -> Self {
        Self {
            violated: AtomicBool::new(false),
        }
    }

    /// True once `handle_violation` has run at least once.
    pub fn is_violated(&self) -> bool {
        self.violated.load(Ordering::SeqCst)
    }

    /// Run the boot gate (Integrity Guard + Live-Instrumentation check in
    /// parallel); any positive routes into `handle_violation`.
    pub async fn boot_check(
        &self,
        probe: &(dyn EnvironmentProbe),
        live_detector: &LiveInstrumentationDetector,
        store: &dyn CredentialBackend,
        entropy: &mut EntropyProvider,
        registry: &LiveBufferRegistry,
        audit: &dyn AuditSink,
    ) -> VaultResult<()> {
        match boot_gate(probe, live_detector).await {
            Ok(()) => Ok(()),
            Err(VaultError::EnvironmentUnsafe(reason)) => {
                Err(self.handle_violation(&reason, store, entropy, registry, audit).await)
            }
            Err(other) => Err(other),
        }
    }

    /// One-shot, reentrancy-guarded violation handler. Destroys the device
    /// salt, wipes the ephemeral memory salt and runtime entropy, and wipes
    /// all tracked live buffers, executing every step even if an earlier
    /// one fails. Every invocation after the first short-circuits to the
    /// same terminal error without repeating the destructive steps.
    pub async fn handle_violation(
        &self,
        reason: &str,
        store: &dyn CredentialBackend,
        entropy: &mut EntropyProvider,
        registry: &LiveBufferRegistry,
        audit: &dyn AuditSink,
    ) -> VaultError {
        let identifier = security_violation_identifier(reason);

        if self.violated.swap(true, Ordering::SeqCst) {
            return VaultError::SecurityViolation(identifier);
        }

        root_key::destroy_device_salt(store);
        entropy.wipe();
        registry.evict_all().await;
        audit.log(crate::audit::AuditEntry::new(AuditEvent::DeviceSaltDestroyed, None));
        audit.log(crate::audit::AuditEntry::new(
            AuditEvent::ViolationDetected {
                reason: reason.to_string(),
            },
            None,
        ));

        VaultError::SecurityViolation(identifier)
    }

    /// `active → background`: wipe all tracked live buffers and the
    /// ephemeral memory salt / runtime entropy, then run `on_background`.
    pub async fn enter_background(
        &self,
        entropy: &mut EntropyProvider,
        registry: &LiveBufferRegistry,
        audit: &dyn AuditSink,
        on_background: impl FnOnce(),
    ) {
        registry.evict_all().await;
        entropy.wipe();
        on_background();
        audit.log(crate::audit::AuditEntry::new(AuditEvent::LifecycleBackground, None));
    }

    /// `→ active`: regenerate runtime entropy (new memory salt, counters
    /// reset).
    pub fn enter_active(&self, entropy: &mut EntropyProvider, audit: &dyn AuditSink) -> VaultResult<()> {
        entropy.regenerate()?;
        audit.log(crate::audit::AuditEntry::new(AuditEvent::LifecycleActive, None));
        Ok(())
    }
}

impl Default for SecurityOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

//! Integrity Guard & Live-Instrumentation Detector: boot-time and periodic
//! environment checks. The concrete OS-level probes are platform-specific
//! and supplied by the embedding application through `EnvironmentProbe`;
//! this module owns running them in parallel, aggregating a verdict, and
//! throttling the live check to once per interval.

use crate::error::VaultResult;
use crate::time;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Minimum interval between live-instrumentation checks, in milliseconds.
pub const LIVE_CHECK_THROTTLE_MS: u64 = 8_000;

/// Platform-specific environment probes. The embedding application
/// implements this against real OS facilities; `AlwaysCleanProbe` is a
/// deterministic stand-in for hosts/tests where none apply.
pub trait EnvironmentProbe: Send + Sync {
    /// Superuser-binary / system-directory-write probe.
    fn is_rooted(&self) -> bool;
    /// Known emulator artefact probe.
    fn is_emulator(&self) -> bool;
    /// CPU micro-benchmark wall-time threshold probe.
    fn debugger_detected(&self) -> bool;
    /// Signing-certificate fingerprint mismatch against a build-embedded hash.
    fn signature_mismatch(&self) -> bool;

    /// Well-known runtime-injection identifiers present in the global namespace.
    fn injection_identifiers_present(&self) -> bool;
    /// Prototype/identity tampering on core built-ins.
    fn prototype_tampered(&self) -> bool;
    /// Built-in function source-form tampering.
    fn builtin_source_tampered(&self) -> bool;
    /// Timing-variance micro-loop: `variance > 5ms² with mean > 2ms`.
    fn timing_variance_anomalous(&self) -> bool;
}

/// A deterministic probe reporting a clean environment on every check.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCleanProbe;

impl EnvironmentProbe for AlwaysCleanProbe {
    fn is_rooted(&self) -> bool {
        false
    }
    fn is_emulator(&self) -> bool {
        false
    }
    fn debugger_detected(&self) -> bool {
        false
    }
    fn signature_mismatch(&self) -> bool {
        false
    }
    fn injection_identifiers_present(&self) -> bool {
        false
    }
    fn prototype_tampered(&self) -> bool {
        false
    }
    fn builtin_source_tampered(&self) -> bool {
        false
    }
    fn timing_variance_anomalous(&self) -> bool {
        false
    }
}

/// Verdict of a boot-time integrity check, naming the first positive found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootVerdict {
    /// No boot check found a positive.
    Clean,
    /// At least one boot check found a positive.
    Unsafe(String),
}

/// Run the four boot checks concurrently and aggregate to a verdict.
pub async fn run_boot_checks(probe: &(dyn EnvironmentProbe)) -> BootVerdict {
    let (rooted, emulator, debugger, signature) = tokio::join!(
        async { probe.is_rooted() },
        async { probe.is_emulator() },
        async { probe.debugger_detected() },
        async { probe.signature_mismatch() },
    );

    if rooted {
        return BootVerdict::Unsafe("rooted".to_string());
    }
    if emulator {
        return BootVerdict::Unsafe("emulator".to_string());
    }
    if debugger {
        return BootVerdict::Unsafe("debugger".to_string());
    }
    if signature {
        return BootVerdict::Unsafe("signature-mismatch".to_string());
    }
    BootVerdict::Clean
}

/// Verdict of a live-instrumentation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveVerdict {
    /// No live check found a positive.
    Clean,
    /// At least one live check found a positive.
    Unsafe(String),
    /// Skipped because the throttle interval has not elapsed.
    Throttled,
}

/// Throttles live-instrumentation checks to once per `LIVE_CHECK_THROTTLE_MS`.
pub struct LiveInstrumentationDetector {
    last_check_ms: AtomicU64,
    has_checked: AtomicBool,
}

impl LiveInstrumentationDetector {
    /// Construct a detector that will run its first check immediately.
    pub fn new() -> Self {
        Self {
            last_check_ms: AtomicU64::new(0),
            has_checked: AtomicBool::new(false),
        }
    }

    /// Run the live check if the throttle interval has elapsed; otherwise
    /// report `Throttled` without touching the probe.
    pub fn check(&self, probe: &dyn EnvironmentProbe) -> LiveVerdict {
        let now = time::current_time_millis();
        let last = self.last_check_ms.load(Ordering::SeqCst);
        if self.has_checked.load(Ordering::SeqCst) && now.saturating_sub(last) < LIVE_CHECK_THROTTLE_MS {
            return LiveVerdict::Throttled;
        }
        self.last_check_ms.store(now, Ordering::SeqCst);
        self.has_checked.store(true, Ordering::SeqCst);

        if probe.injection_identifiers_present() {
            return LiveVerdict::Unsafe("injection-identifiers".to_string());
        }
        if probe.prototype_tampered() {
            return LiveVerdict::Unsafe("prototype-tampered".to_string());
        }
        if probe.builtin_source_tampered() {
            return LiveVerdict::Unsafe("builtin-source-tampered".to_string());
        }
        if probe.timing_variance_anomalous() {
            return LiveVerdict::Unsafe("timing-variance".to_string());
        }
        LiveVerdict::Clean
    }
}

impl Default for LiveInstrumentationDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the boot gate: boot checks and one live check in parallel, any
/// positive mapped to a reason string for the violation handler.
pub async fn boot_gate(
    probe: &(dyn EnvironmentProbe),
    live_detector: &LiveInstrumentationDetector,
) -> VaultResult<()> {
    let boot_fut = run_boot_checks(probe);
    let live_verdict = live_detector.check(probe);
    let boot_verdict = boot_fut.await;

    if let BootVerdict::Unsafe(reason) = boot_verdict {
        return Err(crate::error::VaultError::EnvironmentUnsafe(reason));
    }
    if let LiveVerdict::Unsafe(reason) = live_verdict {
        return Err(crate::error::VaultError::EnvironmentUnsafe(reason));
    }
    Ok(())
}

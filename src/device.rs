//! Device binding: a stable fingerprint hash folded into the Root Secret
//! password, so the vault only opens on the device it was created on.

use sha2::{Digest, Sha256};

/// Supplies the raw platform identifiers device binding folds together.
/// The concrete probes (installation ID, manufacturer, OS version, ...)
/// are platform-specific and must be supplied by the embedding application;
/// this crate only aggregates and hashes whatever fields are present.
pub trait DeviceIdentifierSource: Send + Sync {
    /// Installation-scoped identifier, stable across app restarts.
    fn installation_id(&self) -> Option<String>;
    /// Device manufacturer name.
    fn manufacturer(&self) -> Option<String>;
    /// Device model name.
    fn model(&self) -> Option<String>;
    /// User-assigned device name.
    fn device_name(&self) -> Option<String>;
    /// Operating system version string.
    fn os_version(&self) -> Option<String>;
    /// Total device memory, in bytes.
    fn total_memory(&self) -> Option<u64>;
    /// CPU architecture identifiers (e.g. `["arm64-v8a", "armeabi-v7a"]`).
    fn cpu_archs(&self) -> Vec<String>;
    /// Install time, Unix milliseconds.
    fn install_time_ms(&self) -> Option<i64>;
}

/// Result of aggregating a `DeviceIdentifierSource`.
pub struct DeviceBinding {
    /// The raw `k1:v1||k2:v2||...` textual aggregation. Held only
    /// transiently; callers should drop it after reading `hash`.
    pub raw: String,
    /// `sha256_hex(raw)`.
    pub hash: String,
}

/// Aggregate the identifiers from `source` into the fixed textual form
/// `k1:v1||k2:v2||...`, in this field order: installation-ID, manufacturer,
/// model, device-name, OS-version, total-memory, CPU-archs, install-time.
/// Missing fields are omitted, never defaulted.
pub fn compute_binding(source: &dyn DeviceIdentifierSource) -> DeviceBinding {
    let mut parts: Vec<String> = Vec::new();

    if let Some(v) = source.installation_id() {
        parts.push(format!("installId:{}", v));
    }
    if let Some(v) = source.manufacturer() {
        parts.push(format!("manufacturer:{}", v));
    }
    if let Some(v) = source.model() {
        parts.push(format!("model:{}", v));
    }
    if let Some(v) = source.device_name() {
        parts.push(format!("deviceName:{}", v));
    }
    if let Some(v) = source.os_version() {
        parts.push(format!("osVersion:{}", v));
    }
    if let Some(v) = source.total_memory() {
        parts.push(format!("totalMemory:{}", v));
    }
    let archs = source.cpu_archs();
    if !archs.is_empty() {
        parts.push(format!("cpuArchs:{}", archs.join("|")));
    }
    if let Some(v) = source.install_time_ms() {
        parts.push(format!("installTime:{}", v));
    }

    let raw = parts.join("||");
    let hash = hex::encode(Sha256::digest(raw.as_bytes()));

    DeviceBinding { raw, hash }
}

/// A deterministic source for tests: every field present with a fixed value.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceIdentifierSource {
    /// Installation identifier to report.
    pub installation_id: Option<String>,
    /// Manufacturer to report.
    pub manufacturer: Option<String>,
    /// Model to report.
    pub model: Option<String>,
    /// Device name to report.
    pub device_name: Option<String>,
    /// OS version to report.
    pub os_version: Option<String>,
    /// Total memory to report.
    pub total_memory: Option<u64>,
    /// CPU archs to report.
    pub cpu_archs: Vec<String>,
    /// Install time to report.
    pub install_time_ms: Option<i64>,
}

impl DeviceIdentifierSource for StaticDeviceIdentifierSource {
    fn installation_id(&self) -> Option<String> {
        self.installation_id.clone()
    }
    fn manufacturer(&self) -> Option<String> {
        self.manufacturer.clone()
    }
    fn model(&self) -> Option<String> {
        self.model.clone()
    }
    fn device_name(&self) -> Option<String> {
        self.device_name.clone()
    }
    fn os_version(&self) -> Option<String> {
        self.os_version.clone()
    }
    fn total_memory(&self) -> Option<u64> {
        self.total_memory
    }
    fn cpu_archs(&self) -> Vec<String> {
        self.cpu_archs.clone()
    }
    fn install_time_ms(&self) -> Option<i64> {
        self.install_time_ms
    }
}

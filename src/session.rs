//! `VaultSession`: the façade bootstrapped once per process, owning the
//! active Chapter Key Bundles and the Live Buffer Registry behind the
//! cooperative scheduler's mutexes, per the concurrency model.

use crate::audit::{AuditEntry, AuditEvent, AuditSink};
use crate::chapter_key::ChapterKeyBundle;
use crate::config::VaultConfig;
use crate::credential::{CredentialBackend, KEY_ROTATION_TIMESTAMP};
use crate::crypto::aes_gcm::{self, AesKey};
use crate::crypto::random;
use crate::decryptor::{self, ExecutionContext, RandomizedProgramBuilder};
use crate::device::DeviceIdentifierSource;
use crate::entropy::EntropyProvider;
use crate::error::{VaultError, VaultResult};
use crate::fragment::{self, FragmentEntry, FragmentManifest, RawFragment};
use crate::integrity::{EnvironmentProbe, LiveInstrumentationDetector};
use crate::memory::SecretBuffer;
use crate::orchestrator::SecurityOrchestrator;
use crate::registry::LiveBufferRegistry;
use crate::rotation::{self, WrappedChapterKey};
use crate::storage::StorageCoordinator;
use crate::{device, root_key, time};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Metadata returned for an ingested or previously-ingested chapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterMetadata {
    /// Chapter identifier.
    pub chapter_id: String,
    /// Human-readable chapter title.
    pub title: String,
    /// Image identifiers, in reading order.
    pub image_ids: Vec<String>,
    /// Wrapped-key envelope version at the time this metadata was written.
    pub wrapped_key_version: u32,
    /// Epoch milliseconds at ingestion.
    pub created_at_ms: u64,
}

fn derive_aes_key(secret: &[u8]) -> VaultResult<AesKey> {
    Ok(AesKey::from_bytes(&secret[..32.min(secret.len())])?)
}

/// Owns the resources a running vault needs for the process lifetime:
/// storage, credentials, the active chapter key bundles, the live buffer
/// registry, runtime entropy, and the security orchestrator.
pub struct VaultSession {
    config: VaultConfig,
    storage: Mutex<StorageCoordinator>,
    credentials: Box<dyn CredentialBackend>,
    chapter_bundles: Mutex<HashMap<String, ChapterKeyBundle>>,
    registry: LiveBufferRegistry,
    entropy: Mutex<EntropyProvider>,
    orchestrator: SecurityOrchestrator,
    audit: Box<dyn AuditSink>,
    root_secret: SecretBuffer,
}

/// Bootstrap order (idempotent): runtime entropy and the live buffer
/// registry are constructed first since the orchestrator's violation
/// handler needs something to wipe, then orchestrator check → device salt
/// init → storage roots + nomedia markers. Lifecycle hooks are wired by
/// the caller separately; this function only prepares the session state.
pub async fn bootstrap(
    user_id: &str,
    device_source: &dyn DeviceIdentifierSource,
    probe: &dyn EnvironmentProbe,
    storage_backend: Box<dyn crate::storage::StorageBackend>,
    credentials: Box<dyn CredentialBackend>,
    audit: Box<dyn AuditSink>,
    config: VaultConfig,
) -> VaultResult<VaultSession> {
    let live_detector = LiveInstrumentationDetector::new();
    let orchestrator = SecurityOrchestrator::new();
    let mut entropy = EntropyProvider::new(time::current_time_millis())?;
    let registry = LiveBufferRegistry::new(config.max_decrypted_fragments);

    orchestrator
        .boot_check(probe, &live_detector, credentials.as_ref(), &mut entropy, &registry, audit.as_ref())
        .await?;

    root_key::init_device_salt(credentials.as_ref(), user_id)?;

    let mut storage = StorageCoordinator::new(storage_backend);
    storage.init_roots()?;

    let binding = device::compute_binding(device_source);
    let fingerprint = root_key::fingerprint_hash(&binding.hash);
    let root_secret = root_key::derive_root_secret(credentials.as_ref(), &fingerprint, Some(user_id))?;

    Ok(VaultSession {
        config,
        storage: Mutex::new(storage),
        credentials,
        chapter_bundles: Mutex::new(HashMap::new()),
        registry,
        entropy: Mutex::new(entropy),
        orchestrator,
        audit,
        root_secret,
    })
}

impl VaultSession {
    async fn bundle_for(&self, chapter_id: &str) -> VaultResult<()> {
        let mut bundles = self.chapter_bundles.lock().await;
        if !bundles.contains_key(chapter_id) {
            let bundle = crate::chapter_key::derive_bundle(self.root_secret.as_slice(), chapter_id)?;
            bundles.insert(chapter_id.to_string(), bundle);
        }
        Ok(())
    }

    /// Ingest a chapter: derive its key bundle, wrap it at version 1, split
    /// and encrypt every image's fragments, and persist manifests and
    /// chapter metadata.
    pub async fn ingest_chapter(
        &self,
        chapter_id: &str,
        title: &str,
        raw_images: Vec<Vec<u8>>,
    ) -> VaultResult<ChapterMetadata> {
        self.bundle_for(chapter_id).await?;

        let (chapter_root, aes_key, hmac_key, fragment_map_key) = {
            let bundles = self.chapter_bundles.lock().await;
            let bundle = bundles.get(chapter_id).expect("bundle just inserted");
            (
                bundle.chapter_root.as_slice().to_vec(),
                derive_aes_key(bundle.chapter_root.as_slice())?,
                bundle.hmac.as_slice().to_vec(),
                bundle.fragment_map.as_slice().to_vec(),
            )
        };

        let now = time::current_time_millis();
        let wrapped = rotation::wrap_chapter_key(&chapter_root, self.root_secret.as_slice(), chapter_id, 1, now)?;

        let mut storage = self.storage.lock().await;
        storage.init_chapter_dir(chapter_id)?;
        storage.write_wrapped_key(chapter_id, &wrapped)?;

        let mut image_ids = Vec::with_capacity(raw_images.len());
        for (image_index, raw) in raw_images.iter().enumerate() {
            let image_id = format!("{}-img{}", chapter_id, image_index);
            let salt = hex::encode(random::random_bytes(8)?);

            let raw_fragments = fragment::split(raw, self.config.fragment_min_size, self.config.fragment_max_size)?;
            let mut entries = Vec::with_capacity(raw_fragments.len());

            for rf in &raw_fragments {
                let encrypted =
                    fragment::encrypt_fragment_with_key(&chapter_root, &aes_key, &hmac_key, &image_id, rf)?;
                storage.write_fragment(chapter_id, rf.index, &salt, &encrypted.encrypted_data)?;
                entries.push(FragmentEntry {
                    index: rf.index,
                    filename: crate::storage::fragment_filename(chapter_id, rf.index, &salt),
                    hmac_hex: encrypted.hmac_hex,
                    original_size: encrypted.original_size,
                    encrypted_size: encrypted.encrypted_data.len(),
                });
            }

            let manifest = FragmentManifest {
                image_id: image_id.clone(),
                chapter_id: chapter_id.to_string(),
                salt: salt.clone(),
                total_fragments: entries.len(),
                total_size: raw.len(),
                fragments: entries,
            };
            let manifest_json = serde_json::to_vec(&manifest).map_err(|e| VaultError::Storage(e.to_string()))?;
            let manifest_key = derive_aes_key(&fragment_map_key)?;
            let encrypted_manifest =
                aes_gcm::encrypt_combined(&manifest_key, &manifest_json, image_id.as_bytes()).map_err(VaultError::from)?;
            storage.write_manifest_blob(&image_id, &encrypted_manifest)?;

            image_ids.push(image_id);
        }

        let metadata = ChapterMetadata {
            chapter_id: chapter_id.to_string(),
            title: title.to_string(),
            image_ids,
            wrapped_key_version: wrapped.version,
            created_at_ms: now,
        };
        let metadata_json = serde_json::to_vec(&metadata).map_err(|e| VaultError::Storage(e.to_string()))?;
        let metadata_key = {
            let bundles = self.chapter_bundles.lock().await;
            let bundle = bundles.get(chapter_id).expect("bundle just inserted");
            derive_aes_key(bundle.metadata.as_slice())?
        };
        let encrypted_metadata = aes_gcm::encrypt_combined(&metadata_key, &metadata_json, chapter_id.as_bytes())
            .map_err(VaultError::from)?;
        storage.write_chapter_metadata(chapter_id, &encrypted_metadata)?;

        self.audit.log(AuditEntry::new(
            AuditEvent::ChapterIngested {
                chapter_id_hash: crate::audit::hash_for_audit(chapter_id.as_bytes()),
                image_count: metadata.image_ids.len(),
            },
            None,
        ));

        Ok(metadata)
    }

    /// Read back a chapter's metadata, decrypting it under its metadata key.
    pub async fn get_chapter_metadata(&self, chapter_id: &str) -> VaultResult<Option<ChapterMetadata>> {
        self.bundle_for(chapter_id).await?;
        let storage = self.storage.lock().await;
        let blob = match storage.read_chapter_metadata(chapter_id)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let metadata_key = {
            let bundles = self.chapter_bundles.lock().await;
            let bundle = bundles.get(chapter_id).expect("bundle just inserted");
            derive_aes_key(bundle.metadata.as_slice())?
        };
        let plaintext = aes_gcm::decrypt_combined(&metadata_key, &blob, chapter_id.as_bytes())
            .map_err(|_| VaultError::AuthFail)?;
        let metadata: ChapterMetadata =
            serde_json::from_slice(&plaintext).map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(Some(metadata))
    }

    /// Decrypt and render-mutate one fragment of `image_id` via the Virtual
    /// Decryptor, and track the resulting buffer in the Live Buffer Registry
    /// under `page_index`.
    pub async fn load_page(
        &self,
        chapter_id: &str,
        image_id: &str,
        fragment_index: u32,
        page_index: u32,
        chunk_index: i64,
    ) -> VaultResult<Vec<u8>> {
        self.bundle_for(chapter_id).await?;

        let (chapter_root, aes_key, hmac_key) = {
            let bundles = self.chapter_bundles.lock().await;
            let bundle = bundles.get(chapter_id).expect("bundle just inserted");
            (
                bundle.chapter_root.as_slice().to_vec(),
                derive_aes_key(bundle.chapter_root.as_slice())?,
                bundle.hmac.as_slice().to_vec(),
            )
        };

        let (encrypted_data, manifest) = {
            let storage = self.storage.lock().await;
            let manifest_key = {
                let bundles = self.chapter_bundles.lock().await;
                let bundle = bundles.get(chapter_id).expect("bundle just inserted");
                derive_aes_key(bundle.fragment_map.as_slice())?
            };
            let manifest_blob = storage
                .read_manifest_blob(image_id)?
                .ok_or_else(|| VaultError::Storage("manifest not found".to_string()))?;
            let manifest_json = aes_gcm::decrypt_combined(&manifest_key, &manifest_blob, image_id.as_bytes())
                .map_err(|_| VaultError::AuthFail)?;
            let manifest: FragmentManifest =
                serde_json::from_slice(&manifest_json).map_err(|e| VaultError::Storage(e.to_string()))?;
            let data = storage
                .read_fragment(chapter_id, fragment_index, &manifest.salt)?
                .ok_or_else(|| VaultError::Storage("fragment not found".to_string()))?;
            (data, manifest)
        };

        let entry = manifest
            .fragments
            .iter()
            .find(|f| f.index == fragment_index)
            .ok_or_else(|| VaultError::Storage("fragment index not in manifest".to_string()))?;

        let aad_b64 = {
            use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
            BASE64.encode(format!("{}:{}", image_id, fragment_index).as_bytes())
        };

        let entropy_snapshot = {
            let entropy = self.entropy.lock().await;
            entropy.snapshot(chunk_index)
        };

        let ctx = ExecutionContext {
            chapter_root: &chapter_root,
            aes_key: &aes_key,
            hmac_key: &hmac_key,
            image_id,
            index: fragment_index,
            encrypted_data: &encrypted_data,
            stored_hmac_hex: &entry.hmac_hex,
            stored_aad_b64: &aad_b64,
            entropy: &entropy_snapshot,
        };

        let program = RandomizedProgramBuilder.build();
        let mutated = decryptor::execute(&program, &ctx)?;
        self.registry.insert(page_index, mutated.clone()).await;
        Ok(mutated)
    }

    /// Release a page's live buffer ahead of its deferred-wipe timer.
    pub async fn release_page(&self, page_index: u32) {
        self.registry.release(page_index).await;
    }

    /// Record a new scroll velocity sample for subsequent Ephemeral Key
    /// derivations.
    pub async fn set_scroll_velocity(&self, upx_per_ms: i64) {
        self.entropy.lock().await.set_scroll_velocity(upx_per_ms);
    }

    /// Rotate `chapter_id`'s wrapped key if the rotation interval has
    /// elapsed since the last recorded rotation timestamp.
    pub async fn rotate_key_if_due(&self, chapter_id: &str) -> VaultResult<bool> {
        let last = self
            .credentials
            .get(KEY_ROTATION_TIMESTAMP)?
            .map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .parse::<u64>()
                    .unwrap_or(0)
            });
        let now = time::current_time_millis();
        if !rotation::is_rotation_due(last, now) {
            return Ok(false);
        }

        let mut storage = self.storage.lock().await;
        let wrapped = storage
            .read_wrapped_key(chapter_id)?
            .ok_or_else(|| VaultError::Storage("wrapped key not found".to_string()))?;
        let rotated: WrappedChapterKey = rotation::rotate(&wrapped, self.root_secret.as_slice(), chapter_id, now)?;
        storage.write_wrapped_key(chapter_id, &rotated)?;
        self.credentials.put(KEY_ROTATION_TIMESTAMP, now.to_string().into_bytes())?;

        self.audit.log(AuditEntry::new(
            AuditEvent::KeyRotation {
                chapter_id_hash: crate::audit::hash_for_audit(chapter_id.as_bytes()),
                new_version: rotated.version,
            },
            None,
        ));
        Ok(true)
    }

    /// `active → background`: wipe all live buffers and ephemeral entropy,
    /// then invoke `on_background`.
    pub async fn on_background(&self, on_background: impl FnOnce()) {
        let mut entropy = self.entropy.lock().await;
        self.orchestrator
            .enter_background(&mut entropy, &self.registry, self.audit.as_ref(), on_background)
            .await;
    }

    /// `→ active`: regenerate runtime entropy.
    pub async fn on_active(&self) -> VaultResult<()> {
        let mut entropy = self.entropy.lock().await;
        self.orchestrator.enter_active(&mut entropy, self.audit.as_ref())
    }
}

/// Session-internal accessors for integration tests, not part of the
/// production API. Mirrors derived state a caller could reconstruct anyway
/// (chapter root, entropy snapshot) or registry introspection that exists
/// only to make the capacity invariant testable from outside the crate.
#[cfg(feature = "test-util")]
impl VaultSession {
    /// The chapter root key for an already-ingested chapter.
    pub async fn chapter_root_for_test(&self, chapter_id: &str) -> Vec<u8> {
        let bundles = self.chapter_bundles.lock().await;
        bundles
            .get(chapter_id)
            .expect("chapter must be ingested first")
            .chapter_root
            .as_slice()
            .to_vec()
    }

    /// A runtime entropy snapshot at the given chunk index, as `load_page`
    /// would have taken it.
    pub async fn entropy_snapshot_for_test(&self, chunk_index: i64) -> crate::entropy::RuntimeEntropyBundle {
        self.entropy.lock().await.snapshot(chunk_index)
    }

    /// Number of buffers currently tracked in the live buffer registry.
    pub async fn registry_len_for_test(&self) -> usize {
        self.registry.len().await
    }

    /// The live buffer registry's current contents for `page_index`, if any.
    pub async fn registry_get_for_test(&self, page_index: u32) -> Option<Vec<u8>> {
        self.registry.get(page_index).await
    }
}

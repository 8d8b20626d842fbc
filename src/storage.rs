//! Storage Coordinator: path-hashing filesystem layout and the
//! `StorageBackend` abstraction the embedding application implements.

use crate::rotation::WrappedChapterKey;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{VaultError, VaultResult};

/// Directory holding encrypted fragment files.
pub const VAULT_ROOT: &str = ".ls_v";
/// Directory holding encrypted metadata files.
pub const METADATA_ROOT: &str = ".ls_m";
/// Marker filename inhibiting platform media indexing.
pub const NOMEDIA: &str = ".nomedia";

/// Backend for persistent byte storage (caller provides the real
/// filesystem implementation; an in-memory one is provided for tests).
pub trait StorageBackend: Send + Sync {
    /// Write `data` at `path`, creating or overwriting it.
    fn write(&mut self, path: &[u8], data: &[u8]) -> VaultResult<()>;
    /// Read the bytes at `path`, or `None` if absent.
    fn read(&self, path: &[u8]) -> VaultResult<Option<Vec<u8>>>;
    /// Delete `path`; returns whether it existed.
    fn delete(&mut self, path: &[u8]) -> VaultResult<bool>;
}

/// In-memory storage backend, keyed by path bytes. Holds its map behind an
/// `Arc<Mutex<_>>` so a test can clone a handle before boxing the backend
/// into a `StorageCoordinator` and still introspect or tamper with what
/// gets written, exercising the filesystem-layout and tamper scenarios as
/// true integration tests rather than reaching into session internals.
#[derive(Default, Clone)]
pub struct MemoryStorageBackend {
    data: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorageBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Snapshot every stored path and its bytes.
    pub fn snapshot(&self) -> HashMap<Vec<u8>, Vec<u8>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Paths whose UTF-8 form ends with `suffix`.
    pub fn paths_ending_with(&self, suffix: &str) -> Vec<Vec<u8>> {
        self.snapshot()
            .into_keys()
            .filter(|p| String::from_utf8_lossy(p).ends_with(suffix))
            .collect()
    }

    /// Overwrite the bytes stored at `path`, for tamper-scenario tests.
    pub fn overwrite_raw(&self, path: &[u8], data: Vec<u8>) {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_vec(), data);
    }
}

impl StorageBackend for MemoryStorageBackend {
    fn write(&mut self, path: &[u8], data: &[u8]) -> VaultResult<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_vec(), data.to_vec());
        Ok(())
    }

    fn read(&self, path: &[u8]) -> VaultResult<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap_or_else(|e| e.into_inner()).get(path).cloned())
    }

    fn delete(&mut self, path: &[u8]) -> VaultResult<bool> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .is_some())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Per-chapter directory name: `sha256_hex("dir:" ∥ chapterId)`.
pub fn chapter_dir_name(chapter_id: &str) -> String {
    sha256_hex(format!("dir:{}", chapter_id).as_bytes())
}

/// Fragment filename (without directory): `sha256_hex(chapterId ":" fragIdx
/// ":" salt) ∥ ".dat"`.
pub fn fragment_filename(chapter_id: &str, frag_idx: u32, salt: &str) -> String {
    format!(
        "{}.dat",
        sha256_hex(format!("{}:{}:{}", chapter_id, frag_idx, salt).as_bytes())
    )
}

fn meta_key_name(image_id: &str) -> String {
    sha256_hex(format!("meta:{}", image_id).as_bytes())
}

fn wrapped_key_name(chapter_id: &str) -> String {
    sha256_hex(format!("wk:{}", chapter_id).as_bytes())
}

fn chapter_metadata_name(chapter_id: &str) -> String {
    sha256_hex(format!("cm:{}", chapter_id).as_bytes())
}

fn join(parts: &[&str]) -> Vec<u8> {
    parts.join("/").into_bytes()
}

/// Drives the directory layout and Base64/JSON encoding rules over a
/// `StorageBackend`.
pub struct StorageCoordinator {
    backend: Box<dyn StorageBackend>,
}

impl StorageCoordinator {
    /// Wrap a backend.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Write the vault and metadata root `.nomedia` markers. Idempotent.
    pub fn init_roots(&mut self) -> VaultResult<()> {
        self.backend.write(&join(&[VAULT_ROOT, NOMEDIA]), &[])?;
        self.backend.write(&join(&[METADATA_ROOT, NOMEDIA]), &[])?;
        Ok(())
    }

    /// Write a chapter's directory `.nomedia` marker. Idempotent.
    pub fn init_chapter_dir(&mut self, chapter_id: &str) -> VaultResult<()> {
        let dir = chapter_dir_name(chapter_id);
        self.backend.write(&join(&[VAULT_ROOT, &dir, NOMEDIA]), &[])
    }

    /// Persist a fragment's raw ciphertext (`IV ∥ CT ∥ tag`) as Base64 text.
    pub fn write_fragment(
        &mut self,
        chapter_id: &str,
        frag_idx: u32,
        salt: &str,
        ciphertext: &[u8],
    ) -> VaultResult<()> {
        let dir = chapter_dir_name(chapter_id);
        let filename = fragment_filename(chapter_id, frag_idx, salt);
        let path = join(&[VAULT_ROOT, &dir, &filename]);
        self.backend.write(&path, BASE64.encode(ciphertext).as_bytes())
    }

    /// Read and Base64-decode a fragment's raw ciphertext.
    pub fn read_fragment(&self, chapter_id: &str, frag_idx: u32, salt: &str) -> VaultResult<Option<Vec<u8>>> {
        let dir = chapter_dir_name(chapter_id);
        let filename = fragment_filename(chapter_id, frag_idx, salt);
        let path = join(&[VAULT_ROOT, &dir, &filename]);
        match self.backend.read(&path)? {
            Some(text) => {
                let decoded = BASE64
                    .decode(&text)
                    .map_err(|e| VaultError::Storage(format!("corrupt fragment base64: {}", e)))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    /// Persist an image's encrypted (Base64-wrapped) manifest blob.
    pub fn write_manifest_blob(&mut self, image_id: &str, encrypted_blob: &[u8]) -> VaultResult<()> {
        let path = join(&[METADATA_ROOT, &meta_key_name(image_id)]);
        self.backend.write(&path, BASE64.encode(encrypted_blob).as_bytes())
    }

    /// Read an image's encrypted manifest blob.
    pub fn read_manifest_blob(&self, image_id: &str) -> VaultResult<Option<Vec<u8>>> {
        let path = join(&[METADATA_ROOT, &meta_key_name(image_id)]);
        match self.backend.read(&path)? {
            Some(text) => {
                let decoded = BASE64
                    .decode(&text)
                    .map_err(|e| VaultError::Storage(format!("corrupt manifest base64: {}", e)))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    /// Persist a chapter's `WrappedChapterKey` as JSON, as-is (its
    /// `wrapped_b64` field is already ciphertext).
    pub fn write_wrapped_key(&mut self, chapter_id: &str, wrapped: &WrappedChapterKey) -> VaultResult<()> {
        let path = join(&[METADATA_ROOT, &wrapped_key_name(chapter_id)]);
        let json = serde_json::to_vec(wrapped).map_err(|e| VaultError::Storage(e.to_string()))?;
        self.backend.write(&path, &json)
    }

    /// Read and deserialize a chapter's `WrappedChapterKey`.
    pub fn read_wrapped_key(&self, chapter_id: &str) -> VaultResult<Option<WrappedChapterKey>> {
        let path = join(&[METADATA_ROOT, &wrapped_key_name(chapter_id)]);
        match self.backend.read(&path)? {
            Some(json) => {
                let wrapped = serde_json::from_slice(&json).map_err(|e| VaultError::Storage(e.to_string()))?;
                Ok(Some(wrapped))
            }
            None => Ok(None),
        }
    }

    /// Persist a chapter's encrypted (Base64-wrapped) metadata blob.
    pub fn write_chapter_metadata(&mut self, chapter_id: &str, encrypted_blob: &[u8]) -> VaultResult<()> {
        let path = join(&[METADATA_ROOT, &chapter_metadata_name(chapter_id)]);
        self.backend.write(&path, BASE64.encode(encrypted_blob).as_bytes())
    }

    /// Read a chapter's encrypted metadata blob.
    pub fn read_chapter_metadata(&self, chapter_id: &str) -> VaultResult<Option<Vec<u8>>> {
        let path = join(&[METADATA_ROOT, &chapter_metadata_name(chapter_id)]);
        match self.backend.read(&path)? {
            Some(text) => {
                let decoded = BASE64
                    .decode(&text)
                    .map_err(|e| VaultError::Storage(format!("corrupt metadata base64: {}", e)))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_dir_name_deterministic() {
        assert_eq!(chapter_dir_name("ch1"), chapter_dir_name("ch1"));
        assert_ne!(chapter_dir_name("ch1"), chapter_dir_name("ch2"));
    }

    #[test]
    fn test_fragment_filename_distinct_per_index_and_salt() {
        let a = fragment_filename("ch1", 0, "saltA");
        let b = fragment_filename("ch1", 1, "saltA");
        let c = fragment_filename("ch1", 0, "saltB");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".dat"));
    }

    #[test]
    fn test_fragment_roundtrip() {
        let mut coord = StorageCoordinator::new(Box::new(MemoryStorageBackend::new()));
        coord.init_roots().unwrap();
        coord.init_chapter_dir("ch1").unwrap();
        coord.write_fragment("ch1", 0, "salt", b"ciphertext-bytes").unwrap();
        let read = coord.read_fragment("ch1", 0, "salt").unwrap().unwrap();
        assert_eq!(read, b"ciphertext-bytes");
    }

    #[test]
    fn test_missing_fragment_is_none() {
        let coord = StorageCoordinator::new(Box::new(MemoryStorageBackend::new()));
        assert!(coord.read_fragment("ch1", 0, "salt").unwrap().is_none());
    }

    #[test]
    fn test_wrapped_key_roundtrip() {
        let mut coord = StorageCoordinator::new(Box::new(MemoryStorageBackend::new()));
        let wrapped = WrappedChapterKey {
            wrapped_b64: "deadbeef".to_string(),
            rotation_timestamp: 12345,
            version: 3,
        };
        coord.write_wrapped_key("ch1", &wrapped).unwrap();
        let read = coord.read_wrapped_key("ch1").unwrap().unwrap();
        assert_eq!(read, wrapped);
    }

    #[test]
    fn test_manifest_and_chapter_metadata_roundtrip() {
        let mut coord = StorageCoordinator::new(Box::new(MemoryStorageBackend::new()));
        coord.write_manifest_blob("img1", b"encrypted-manifest").unwrap();
        assert_eq!(
            coord.read_manifest_blob("img1").unwrap().unwrap(),
            b"encrypted-manifest"
        );

        coord.write_chapter_metadata("ch1", b"encrypted-meta").unwrap();
        assert_eq!(
            coord.read_chapter_metadata("ch1").unwrap().unwrap(),
            b"encrypted-meta"
        );
    }
}

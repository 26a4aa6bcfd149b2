//! Content-addressed storage for raw submission payloads.
//!
//! Payloads are keyed by `sha256:<hex>` so identical bytes share one blob and
//! a stored payload can never be rewritten under the same reference.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use super::IntakeError;

const REF_PREFIX: &str = "sha256:";

/// Storage backend for raw payload bytes.
pub trait PayloadStore: Send + Sync {
    /// Store bytes and return their reference. Idempotent for identical bytes.
    fn put(&self, bytes: &[u8]) -> Result<String, IntakeError>;

    fn get(&self, payload_ref: &str) -> Result<Vec<u8>, IntakeError>;
}

/// Reference for a payload: `sha256:` followed by the lowercase hex digest.
pub fn payload_ref(bytes: &[u8]) -> String {
    format!("{REF_PREFIX}{}", hex::encode(Sha256::digest(bytes)))
}

/// Extract the digest from a reference, rejecting anything that is not 64 hex chars.
fn digest_of(payload_ref: &str) -> Result<&str, IntakeError> {
    payload_ref
        .strip_prefix(REF_PREFIX)
        .filter(|d| d.len() == 64 && d.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| IntakeError::PayloadNotFound(payload_ref.to_string()))
}

/// Filesystem store: `<root>/<first two hex chars>/<digest>`.
pub struct FsPayloadStore {
    root: PathBuf,
}

impl FsPayloadStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, IntakeError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.root.join(&digest[..2]).join(digest)
    }
}

impl PayloadStore for FsPayloadStore {
    fn put(&self, bytes: &[u8]) -> Result<String, IntakeError> {
        let reference = payload_ref(bytes);
        let digest = digest_of(&reference)?;
        let target = self.blob_path(digest);

        if target.exists() {
            tracing::debug!(payload_ref = %reference, "Payload already stored");
            return Ok(reference);
        }

        let dir = target
            .parent()
            .ok_or_else(|| IntakeError::PayloadNotFound(reference.clone()))?;
        std::fs::create_dir_all(dir)?;

        // Write to a sibling temp file, then rename into place.
        let staging = dir.join(format!(".{digest}.{}.tmp", uuid::Uuid::new_v4()));
        std::fs::write(&staging, bytes)?;
        if let Err(e) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }

        tracing::debug!(payload_ref = %reference, size = bytes.len(), "Payload stored");
        Ok(reference)
    }

    fn get(&self, payload_ref: &str) -> Result<Vec<u8>, IntakeError> {
        let digest = digest_of(payload_ref)?;
        match std::fs::read(self.blob_path(digest)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(IntakeError::PayloadNotFound(payload_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and ephemeral engines.
#[derive(Default)]
pub struct MemoryPayloadStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadStore for MemoryPayloadStore {
    fn put(&self, bytes: &[u8]) -> Result<String, IntakeError> {
        let reference = payload_ref(bytes);
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| IntakeError::Io(std::io::Error::other("payload store lock poisoned")))?;
        blobs.entry(reference.clone()).or_insert_with(|| bytes.to_vec());
        Ok(reference)
    }

    fn get(&self, payload_ref: &str) -> Result<Vec<u8>, IntakeError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| IntakeError::Io(std::io::Error::other("payload store lock poisoned")))?;
        blobs
            .get(payload_ref)
            .cloned()
            .ok_or_else(|| IntakeError::PayloadNotFound(payload_ref.to_string()))
    }
}

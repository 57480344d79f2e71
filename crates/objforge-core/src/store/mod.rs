//! Artifact store: uploaded submissions and engine-derived artifacts.
//!
//! Identity is purely by naming convention. A submission is stored as
//! `{unix_timestamp}_{original_name}`; its derived artifact lives in the
//! output directory as `{base}.{ext}` where `base` is the stored name minus
//! its extension. No index is kept.
//!
//! # Modules
//!
//! - [`naming`]: stored-name generation, extension swap, name validation
//! - [`fs`]: `FsArtifactStore`, the filesystem implementation

pub mod fs;
pub mod naming;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use fs::FsArtifactStore;

/// Errors from artifact store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("submission not found: {0}")]
    NotFound(String),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free name for {name:?} after {attempts} attempts")]
    Exhausted { name: String, attempts: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored copy of a client upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Opaque token handed back to the client (`{timestamp}_{original_name}`).
    pub stored_name: String,
    pub original_name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    /// Hex SHA-256 of the stored bytes.
    pub digest: String,
}

/// An engine output that has been promoted to its visible location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedArtifact {
    /// Stored name of the submission this was derived from.
    pub stored_name: String,
    /// Filename offered to the client, e.g. `1700000000_cat.obj`.
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Private location the engine writes to before promotion.
///
/// The containing directory is removed when this value is dropped, so a
/// failed or abandoned run leaves nothing behind.
#[derive(Debug)]
pub struct StagedOutput {
    dir: tempfile::TempDir,
    path: PathBuf,
}

impl StagedOutput {
    pub(crate) fn new(dir: tempfile::TempDir, file_name: &str) -> Self {
        let path = dir.path().join(file_name);
        Self { dir, path }
    }

    /// Path to hand to the engine.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Hex SHA-256 of `data`.
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Storage backend for submissions and derived artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Store `data` under a fresh `{now}_{original_name}` name. Never overwrites.
    fn put(&self, data: &[u8], original_name: &str) -> Result<Submission>;

    /// Path of a submission. Pure join; existence is not checked.
    fn resolve_input_path(&self, stored_name: &str) -> Result<PathBuf>;

    /// Path of the artifact derived from `stored_name`. Pure join.
    fn resolve_output_path(&self, stored_name: &str) -> Result<PathBuf>;

    fn exists(&self, path: &Path) -> bool;

    /// Read back a submission's bytes.
    fn read_input(&self, stored_name: &str) -> Result<Vec<u8>>;

    /// Delete a submission. Missing files are not an error.
    fn remove(&self, stored_name: &str) -> Result<()>;

    /// Reserve a private path for one engine run against `stored_name`.
    fn stage_output(&self, stored_name: &str) -> Result<StagedOutput>;

    /// Atomically move a staged output onto the artifact path for `stored_name`.
    fn promote(&self, staged: StagedOutput, stored_name: &str) -> Result<DerivedArtifact>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_hex_sha256() {
        let d = content_digest(b"hello world");
        assert_eq!(d.len(), 64);
        assert_eq!(
            d,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn store_error_display_names_path() {
        let err = StoreError::Write {
            path: PathBuf::from("/uploads/1_cat.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/uploads/1_cat.jpg"));
        assert!(msg.contains("denied"));
    }
}

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::debug;

use super::naming::{derived_name, stored_name, validate_name};
use super::{
    content_digest, ArtifactStore, DerivedArtifact, Result, StagedOutput, StoreError, Submission,
};
use crate::config::GatewayConfig;

/// Upper bound on `{ts}-{n}_` suffixes tried before giving up on a name.
pub const MAX_NAME_ATTEMPTS: u32 = 100;

/// Per-run staging directories live under `<output_dir>/.staging/`.
pub const STAGING_DIR: &str = ".staging";

/// Filesystem-backed artifact store over two flat directories.
///
/// Layout:
/// - `<upload_dir>/<timestamp>_<original_name>`
/// - `<output_dir>/<base>.<extension>`
/// - `<output_dir>/.staging/run-*/<base>.<extension>` (transient)
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    extension: String,
}

impl FsArtifactStore {
    /// Create a store over `upload_dir` and `output_dir`, creating both if needed.
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let upload_dir = upload_dir.into();
        let output_dir = output_dir.into();
        fs::create_dir_all(&upload_dir)?;
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            upload_dir,
            output_dir,
            extension: extension.into(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        Self::new(
            &config.upload_dir,
            &config.output_dir,
            &config.output_extension,
        )
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// [`ArtifactStore::put`] with an explicit clock reading.
    ///
    /// The bytes are staged in a temp file next to their final location and
    /// linked into place without clobbering. On a name collision the next
    /// suffix is tried, so concurrent identical uploads get distinct names.
    pub fn put_at(
        &self,
        data: &[u8],
        original_name: &str,
        at: DateTime<Utc>,
    ) -> Result<Submission> {
        validate_name(original_name)?;

        let write_err = |path: &Path, source: std::io::Error| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.upload_dir)
            .map_err(|e| write_err(self.upload_dir.as_path(), e))?;
        tmp.write_all(data).map_err(|e| write_err(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| write_err(tmp.path(), e))?;

        let timestamp = at.timestamp();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = stored_name(timestamp, original_name, attempt);
            let path = self.upload_dir.join(&name);

            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    return Ok(Submission {
                        stored_name: name,
                        original_name: original_name.to_string(),
                        path,
                        created_at: at,
                        size: data.len() as u64,
                        digest: content_digest(data),
                    });
                }
                Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                    debug!(stored_name = %name, attempt, "stored name taken, retrying with suffix");
                    tmp = err.file;
                }
                Err(err) => return Err(write_err(path.as_path(), err.error)),
            }
        }

        Err(StoreError::Exhausted {
            name: original_name.to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    fn staging_root(&self) -> PathBuf {
        self.output_dir.join(STAGING_DIR)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, data: &[u8], original_name: &str) -> Result<Submission> {
        self.put_at(data, original_name, Utc::now())
    }

    fn resolve_input_path(&self, stored_name: &str) -> Result<PathBuf> {
        validate_name(stored_name)?;
        Ok(self.upload_dir.join(stored_name))
    }

    fn resolve_output_path(&self, stored_name: &str) -> Result<PathBuf> {
        validate_name(stored_name)?;
        Ok(self
            .output_dir
            .join(derived_name(stored_name, &self.extension)))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_input(&self, stored_name: &str) -> Result<Vec<u8>> {
        let path = self.resolve_input_path(stored_name)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::NotFound(stored_name.to_string())
            } else {
                StoreError::Io(e)
            }
        })
    }

    fn remove(&self, stored_name: &str) -> Result<()> {
        let path = self.resolve_input_path(stored_name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn stage_output(&self, stored_name: &str) -> Result<StagedOutput> {
        validate_name(stored_name)?;
        let root = self.staging_root();
        fs::create_dir_all(&root)?;
        let dir = tempfile::Builder::new().prefix("run-").tempdir_in(&root)?;
        Ok(StagedOutput::new(
            dir,
            &derived_name(stored_name, &self.extension),
        ))
    }

    fn promote(&self, staged: StagedOutput, stored_name: &str) -> Result<DerivedArtifact> {
        let final_path = self.resolve_output_path(stored_name)?;
        fs::rename(staged.path(), &final_path).map_err(|e| StoreError::Write {
            path: final_path.clone(),
            source: e,
        })?;
        let size = fs::metadata(&final_path)?.len();
        drop(staged);

        let file_name = derived_name(stored_name, &self.extension);
        Ok(DerivedArtifact {
            stored_name: stored_name.to_string(),
            file_name,
            path: final_path,
            size,
        })
    }
}

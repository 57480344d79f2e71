//! Gateway API: accept an upload, later derive an artifact from it.
//!
//! `submit` is the cheap ingest step (store + quick engine pass), `derive` the
//! expensive one. Splitting them lets a caller upload once and regenerate as
//! often as needed. Neither operation keeps state beyond the artifact store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Operation, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::store::naming::derived_name;
use crate::store::{ArtifactStore, DerivedArtifact, FsArtifactStore, Submission};
use crate::worker::{InvocationRequest, InvocationResult, Invoker, ProcessInvoker, WorkerError};

/// A file received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Where a derivation reads from and writes to, computed from the stored
/// name alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPlan {
    pub stored_name: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Attachment name offered to the client.
    pub download_name: String,
}

/// Submit/derive front end over an [`ArtifactStore`] and an [`Invoker`].
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    store: Arc<dyn ArtifactStore>,
    invoker: Arc<dyn Invoker>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Production wiring: filesystem store and process invoker built from `config`.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let store = FsArtifactStore::from_config(&config)?;
        let invoker = ProcessInvoker::from_config(&config);
        Ok(Self::with_parts(config, Arc::new(store), Arc::new(invoker)))
    }

    /// Wire explicit collaborators (tests, alternative backends).
    pub fn with_parts(
        config: GatewayConfig,
        store: Arc<dyn ArtifactStore>,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            invoker,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Store an upload and run the submit engine against it.
    ///
    /// Returns the submission whose `stored_name` the caller later passes to
    /// [`Gateway::derive`]. If the engine fails the stored upload is removed.
    #[instrument(skip(self, upload), fields(op = "submit"))]
    pub async fn submit(&self, upload: Option<Upload>) -> Result<Submission> {
        let Upload { filename, data } =
            upload.ok_or_else(|| GatewayError::Validation("No file part".into()))?;
        if filename.is_empty() {
            return Err(GatewayError::Validation("No selected file".into()));
        }
        if data.is_empty() {
            return Err(GatewayError::Validation("Empty file".into()));
        }

        let store = Arc::clone(&self.store);
        let submission = tokio::task::spawn_blocking(move || store.put(&data, &filename))
            .await
            .map_err(|e| GatewayError::Internal(format!("storage task failed: {e}")))??;

        obs::emit_submission_stored(&submission.stored_name, submission.size, &submission.digest);
        METRICS.inc_submissions();

        let request = InvocationRequest::new(
            self.config.submit_engine.clone(),
            self.engine_args(&submission.path),
        );
        let outcome = self
            .invoker
            .invoke(request)
            .await
            .and_then(InvocationResult::into_checked);

        if let Err(source) = outcome {
            METRICS.inc_worker_failures();
            if let Err(e) = self.store.remove(&submission.stored_name) {
                warn!(stored_name = %submission.stored_name, error = %e, "failed to discard submission");
            }
            obs::emit_submission_discarded(&submission.stored_name, &source);
            return Err(GatewayError::worker(Operation::Submit, source));
        }

        Ok(submission)
    }

    /// Input path, output path and download name for `stored_name`.
    pub fn describe(&self, stored_name: &str) -> Result<ArtifactPlan> {
        Ok(ArtifactPlan {
            stored_name: stored_name.to_string(),
            input_path: self.store.resolve_input_path(stored_name)?,
            output_path: self.store.resolve_output_path(stored_name)?,
            download_name: derived_name(stored_name, &self.config.output_extension),
        })
    }

    /// Run the derive engine for `stored_name` and publish its output.
    ///
    /// The engine writes into a private staging path; only a run that exits 0
    /// and actually produced the file is promoted to the visible artifact
    /// path. Repeated calls regenerate and overwrite the artifact.
    #[instrument(skip(self), fields(op = "derive"))]
    pub async fn derive(&self, stored_name: &str) -> Result<DerivedArtifact> {
        let plan = self.describe(stored_name)?;
        if !self.store.exists(&plan.input_path) {
            return Err(GatewayError::SubmissionNotFound(stored_name.to_string()));
        }

        let staged = self.store.stage_output(stored_name)?;
        let mut args = self.engine_args(&plan.input_path);
        args.push(staged.path().to_string_lossy().into_owned());
        let request = InvocationRequest::new(self.config.derive_engine.clone(), args)
            .expect_output(staged.path());

        let outcome = self
            .invoker
            .invoke(request)
            .await
            .and_then(InvocationResult::into_checked);

        if let Err(source) = outcome {
            METRICS.inc_worker_failures();
            let source = match source {
                WorkerError::OutputMissing { .. } => WorkerError::OutputMissing {
                    expected_path: plan.output_path,
                },
                other => other,
            };
            return Err(GatewayError::worker(Operation::Derive, source));
        }

        let store = Arc::clone(&self.store);
        let name = stored_name.to_string();
        let artifact = tokio::task::spawn_blocking(move || store.promote(staged, &name))
            .await
            .map_err(|e| GatewayError::Internal(format!("promote task failed: {e}")))??;

        obs::emit_artifact_derived(&artifact.stored_name, &artifact.file_name, artifact.size);
        METRICS.inc_derivations();
        Ok(artifact)
    }

    /// `[input, quality_factor, model_size, model_dir]`, the arguments shared
    /// by both engine forms.
    fn engine_args(&self, input: &Path) -> Vec<String> {
        vec![
            input.to_string_lossy().into_owned(),
            self.config.quality_factor.clone(),
            self.config.model_size.clone(),
            self.config.model_dir.to_string_lossy().into_owned(),
        ]
    }
}

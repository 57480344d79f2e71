//! Error types for the worker module.

use std::path::PathBuf;

/// Ways an engine run can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn {program}: {cause}")]
    SpawnFailure { program: String, cause: String },

    #[error("worker exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },

    #[error("worker output missing: {}", .expected_path.display())]
    OutputMissing { expected_path: PathBuf },

    #[error("worker timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },
}

impl WorkerError {
    /// Raw diagnostic text to surface to the client, if any.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            WorkerError::SpawnFailure { cause, .. } => Some(cause.clone()),
            WorkerError::NonZeroExit { stderr, .. } => Some(stderr.clone()),
            WorkerError::OutputMissing { expected_path } => {
                Some(format!("expected {}", expected_path.display()))
            }
            WorkerError::Timeout { limit_ms } => {
                Some(format!("engine did not exit within {limit_ms}ms"))
            }
        }
    }
}

/// Result type for worker operations.
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = WorkerError::NonZeroExit {
            status: 2,
            stderr: "model not found".into(),
        };
        assert!(err.to_string().contains("status 2"));
        assert!(err.to_string().contains("model not found"));

        let err = WorkerError::SpawnFailure {
            program: "python3".into(),
            cause: "No such file or directory".into(),
        };
        assert!(err.to_string().contains("python3"));
    }

    #[test]
    fn diagnostic_is_stderr_for_non_zero_exit() {
        let err = WorkerError::NonZeroExit {
            status: 1,
            stderr: "Traceback ...".into(),
        };
        assert_eq!(err.diagnostic().as_deref(), Some("Traceback ..."));
    }
}

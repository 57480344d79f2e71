//! Worker invocation: running the external reconstruction engine.
//!
//! The engine is an opaque program. Exit status 0 means success and anything
//! else means failure, with stderr as the diagnostic. A zero exit is not
//! enough on its own: every output file the caller expects must exist
//! afterwards, which [`InvocationResult::into_checked`] enforces.
//!
//! # Modules
//!
//! - [`process`]: `ProcessInvoker`, spawning via `tokio::process`
//! - [`error`]: `WorkerError` / `WorkerResult`

pub mod error;
pub mod process;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EngineCommand;

pub use error::{WorkerError, WorkerResult};
pub use process::ProcessInvoker;

/// One engine run: the launch prefix, the contract arguments, and the files
/// that must exist once the engine exits successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub command: EngineCommand,
    pub args: Vec<String>,
    #[serde(default)]
    pub expected_outputs: Vec<PathBuf>,
}

impl InvocationRequest {
    pub fn new(command: EngineCommand, args: Vec<String>) -> Self {
        Self {
            command,
            args,
            expected_outputs: Vec::new(),
        }
    }

    pub fn expect_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_outputs.push(path.into());
        self
    }

    /// Full argument vector after the program name.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        self.command
            .args
            .iter()
            .chain(self.args.iter())
            .map(String::as_str)
    }
}

/// Outcome of a single engine run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Exit code; `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub expected_outputs: Vec<PathBuf>,
    pub elapsed_ms: u64,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Exit code with signal termination reported as `-1`.
    pub fn exit_code(&self) -> i32 {
        self.status.unwrap_or(-1)
    }

    /// Expected outputs that are not on disk.
    pub fn missing_outputs(&self) -> Vec<&Path> {
        self.expected_outputs
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| !p.exists())
            .collect()
    }

    /// Apply the worker contract: non-zero exit first, then missing outputs.
    pub fn into_checked(self) -> WorkerResult<Self> {
        if !self.success() {
            return Err(WorkerError::NonZeroExit {
                status: self.exit_code(),
                stderr: self.stderr,
            });
        }
        if let Some(missing) = self.missing_outputs().first() {
            return Err(WorkerError::OutputMissing {
                expected_path: missing.to_path_buf(),
            });
        }
        Ok(self)
    }
}

/// Seam between the gateway and process spawning.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Run the engine once and report what happened. Implementations only
    /// return `Err` when the run could not complete (spawn failure, timeout);
    /// contract checks are left to [`InvocationResult::into_checked`].
    async fn invoke(&self, request: InvocationRequest) -> WorkerResult<InvocationResult>;
}

/// Keep at most `max_bytes` of `output`, cut on a UTF-8 boundary.
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n\n[truncated: showing {}/{} bytes]",
        &output[..cut],
        cut,
        output.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Option<i32>, outputs: Vec<PathBuf>) -> InvocationResult {
        InvocationResult {
            status,
            stdout: String::new(),
            stderr: "boom".into(),
            expected_outputs: outputs,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn argv_appends_contract_args_after_prefix() {
        let req = InvocationRequest::new(
            EngineCommand::new("python3").arg("process_3d.py"),
            vec!["in.jpg".into(), "1".into()],
        );
        assert_eq!(req.argv().collect::<Vec<_>>(), vec!["process_3d.py", "in.jpg", "1"]);
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        match result(Some(3), vec![]).into_checked() {
            Err(WorkerError::NonZeroExit { status, stderr }) => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[test]
    fn signal_termination_is_non_zero() {
        let err = result(None, vec![]).into_checked().unwrap_err();
        assert!(matches!(err, WorkerError::NonZeroExit { status: -1, .. }));
    }

    #[test]
    fn zero_exit_without_output_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("1_cat.obj");
        match result(Some(0), vec![expected.clone()]).into_checked() {
            Err(WorkerError::OutputMissing { expected_path }) => assert_eq!(expected_path, expected),
            other => panic!("expected OutputMissing, got {other:?}"),
        }
    }

    #[test]
    fn zero_exit_with_output_passes() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("1_cat.obj");
        std::fs::write(&expected, b"o mesh\n").unwrap();
        assert!(result(Some(0), vec![expected]).into_checked().is_ok());
    }

    #[test]
    fn truncate_respects_char_boundary() {
        let text = "héllo wörld";
        let out = truncate_output(text, 2);
        assert!(out.starts_with('h'));
        assert!(out.contains("[truncated: showing 1/13 bytes]"));
        assert_eq!(truncate_output("short", 100), "short");
    }
}

//! Out-of-process engine invocation with an optional wall-clock limit.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use super::{truncate_output, InvocationRequest, InvocationResult, Invoker, WorkerError, WorkerResult};
use crate::config::{GatewayConfig, DEFAULT_MAX_DIAGNOSTIC_BYTES};
use crate::obs;

/// Spawns the engine as a child process and waits for it to exit.
///
/// The child is killed if the configured timeout elapses or if the awaiting
/// future is dropped.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    timeout: Option<Duration>,
    max_output_bytes: usize,
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new(None, DEFAULT_MAX_DIAGNOSTIC_BYTES)
    }
}

impl ProcessInvoker {
    pub fn new(timeout_ms: Option<u64>, max_output_bytes: usize) -> Self {
        Self {
            timeout: timeout_ms.map(Duration::from_millis),
            max_output_bytes,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.worker_timeout_ms, config.max_diagnostic_bytes)
    }
}

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn invoke(&self, request: InvocationRequest) -> WorkerResult<InvocationResult> {
        let program = request.command.program.clone();
        let argv: Vec<&str> = request.argv().collect();
        obs::emit_worker_started(&program, &argv);

        let mut cmd = Command::new(&program);
        cmd.args(&argv).stdin(Stdio::null()).kill_on_drop(true);

        let started = Instant::now();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(output) => output,
                Err(_elapsed) => {
                    let limit_ms = limit.as_millis() as u64;
                    obs::emit_worker_timed_out(&program, limit_ms);
                    return Err(WorkerError::Timeout { limit_ms });
                }
            },
            None => cmd.output().await,
        }
        .map_err(|e| WorkerError::SpawnFailure {
            program: program.clone(),
            cause: e.to_string(),
        })?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = InvocationResult {
            status: output.status.code(),
            stdout: truncate_output(&String::from_utf8_lossy(&output.stdout), self.max_output_bytes),
            stderr: truncate_output(&String::from_utf8_lossy(&output.stderr), self.max_output_bytes),
            expected_outputs: request.expected_outputs.clone(),
            elapsed_ms,
        };
        obs::emit_worker_finished(&program, result.exit_code(), elapsed_ms);
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::EngineCommand;

    fn sh(script: &str) -> InvocationRequest {
        InvocationRequest::new(EngineCommand::new("sh").arg("-c").arg(script), vec![])
    }

    #[tokio::test]
    async fn captures_status_and_streams() {
        let invoker = ProcessInvoker::default();
        let result = invoker
            .invoke(sh("echo out; echo err >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(result.status, Some(3));
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert!(!result.success());
    }

    #[tokio::test]
    async fn contract_args_reach_the_program() {
        let invoker = ProcessInvoker::default();
        let request = InvocationRequest::new(
            EngineCommand::new("sh").arg("-c").arg("echo \"$1|$2\"").arg("engine"),
            vec!["in.jpg".into(), "1".into()],
        );
        let result = invoker.invoke(request).await.unwrap();
        assert_eq!(result.stdout.trim(), "in.jpg|1");
        assert!(result.success());
    }

    #[tokio::test]
    async fn missing_program_is_spawn_failure() {
        let invoker = ProcessInvoker::default();
        let request = InvocationRequest::new(
            EngineCommand::new("/definitely/not/an/engine"),
            vec![],
        );
        match invoker.invoke(request).await {
            Err(WorkerError::SpawnFailure { program, .. }) => {
                assert_eq!(program, "/definitely/not/an/engine")
            }
            other => panic!("expected SpawnFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_engine_times_out() {
        let invoker = ProcessInvoker::new(Some(100), 1024);
        let started = Instant::now();
        match invoker.invoke(sh("sleep 5")).await {
            Err(WorkerError::Timeout { limit_ms }) => assert_eq!(limit_ms, 100),
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn long_stderr_is_truncated() {
        let invoker = ProcessInvoker::new(None, 16);
        let result = invoker
            .invoke(sh("i=0; while [ $i -lt 100 ]; do printf x >&2; i=$((i+1)); done; exit 1"))
            .await
            .unwrap();
        assert!(result.stderr.starts_with("xxxxxxxxxxxxxxxx\n"));
        assert!(result.stderr.contains("[truncated: showing 16/100 bytes]"));
    }
}

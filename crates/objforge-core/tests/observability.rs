//! Structured events emitted over a gateway request lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use objforge_core::obs::{
    emit_artifact_derived, emit_job_transition, emit_request_failed, emit_submission_discarded,
    emit_submission_stored, emit_worker_finished, emit_worker_timed_out,
};
use objforge_core::{
    FsArtifactStore, Gateway, GatewayConfig, InvocationRequest, InvocationResult, Invoker, Upload,
    WorkerResult,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn submission_stored_logs_name_and_digest() {
    emit_submission_stored("1700000000_cat.jpg", 4, "deadbeef");
    assert!(logs_contain("submission.stored"));
    assert!(logs_contain("1700000000_cat.jpg"));
    assert!(logs_contain("deadbeef"));
}

#[traced_test]
#[test]
fn worker_events_carry_program_and_status() {
    emit_worker_finished("python3", 2, 1500);
    emit_worker_timed_out("python3", 60_000);
    assert!(logs_contain("worker.finished"));
    assert!(logs_contain("worker.timed_out"));
    assert!(logs_contain("limit_ms=60000"));
}

#[traced_test]
#[test]
fn failure_events_log_at_warn() {
    emit_submission_discarded("1_cat.jpg", &"exit status 1");
    emit_request_failed("derive", 500, &"OBJ generation failed!");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("request.failed"));
}

#[traced_test]
#[test]
fn artifact_and_job_events() {
    emit_artifact_derived("1_cat.jpg", "1_cat.obj", 128);
    emit_job_transition("6f1c", "1_cat.jpg", "running");
    assert!(logs_contain("artifact.derived"));
    assert!(logs_contain("job.transition"));
}

struct WritingInvoker;

#[async_trait]
impl Invoker for WritingInvoker {
    async fn invoke(&self, request: InvocationRequest) -> WorkerResult<InvocationResult> {
        for path in &request.expected_outputs {
            std::fs::write(path, b"o mesh\n").unwrap();
        }
        Ok(InvocationResult {
            status: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            expected_outputs: request.expected_outputs,
            elapsed_ms: 0,
        })
    }
}

#[traced_test]
#[tokio::test]
async fn gateway_operations_emit_lifecycle_events() {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig::rooted(dir.path());
    let store = Arc::new(FsArtifactStore::from_config(&config).unwrap());
    let gw = Gateway::with_parts(config, store, Arc::new(WritingInvoker));

    let sub = gw
        .submit(Some(Upload::new("cat.jpg", b"jpeg".to_vec())))
        .await
        .unwrap();
    gw.derive(&sub.stored_name).await.unwrap();

    assert!(logs_contain("submission.stored"));
    assert!(logs_contain("artifact.derived"));
    assert!(logs_contain(&sub.stored_name));
}

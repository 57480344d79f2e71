//! Structured observability hooks for the gateway request lifecycle.
//!
//! One function per lifecycle event: submission stored or discarded, engine
//! started, finished or timed out, artifact derived, job transitions, and
//! request failures. Gateway operations open their own spans with
//! `#[instrument]`, so these events inherit `stored_name` context.
//!
//! Events are emitted at `info!` level (failures at `warn!`). Filtering and
//! JSON output are configured by [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

/// Emit event: an upload was persisted.
pub fn emit_submission_stored(stored_name: &str, size: u64, digest: &str) {
    info!(
        event = "submission.stored",
        stored_name = %stored_name,
        size = size,
        digest = %digest,
    );
}

/// Emit event: a stored upload was dropped after its submit-time engine run failed.
pub fn emit_submission_discarded(stored_name: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "submission.discarded", stored_name = %stored_name, reason = %reason);
}

/// Emit event: engine process about to be spawned.
pub fn emit_worker_started(program: &str, argv: &[&str]) {
    info!(event = "worker.started", program = %program, argv = ?argv);
}

/// Emit event: engine process exited (any status).
pub fn emit_worker_finished(program: &str, status: i32, elapsed_ms: u64) {
    info!(
        event = "worker.finished",
        program = %program,
        status = status,
        elapsed_ms = elapsed_ms,
        success = status == 0,
    );
}

/// Emit event: engine process killed after exceeding its time limit.
pub fn emit_worker_timed_out(program: &str, limit_ms: u64) {
    warn!(event = "worker.timed_out", program = %program, limit_ms = limit_ms);
}

/// Emit event: a derived artifact was promoted to its visible path.
pub fn emit_artifact_derived(stored_name: &str, file_name: &str, size: u64) {
    info!(
        event = "artifact.derived",
        stored_name = %stored_name,
        file_name = %file_name,
        size = size,
    );
}

/// Emit event: a queued job changed status.
pub fn emit_job_transition(job_id: &str, stored_name: &str, status: &str) {
    info!(event = "job.transition", job_id = %job_id, stored_name = %stored_name, status = %status);
}

/// Emit event: a gateway operation failed and was normalized for the client.
pub fn emit_request_failed(op: &str, status: u16, error: &dyn std::fmt::Display) {
    warn!(event = "request.failed", op = %op, status = status, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitters_do_not_panic_without_subscriber() {
        emit_submission_stored("1_cat.jpg", 10, "abc");
        emit_worker_started("sh", &["-c", "true"]);
        emit_worker_finished("sh", 0, 3);
        emit_request_failed("derive", 500, &"boom");
    }
}

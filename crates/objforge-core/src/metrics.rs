//! Global atomic counters for gateway observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event, or [`Metrics::snapshot`] to serve them over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters.
pub struct Metrics {
    submissions_stored: AtomicU64,
    artifacts_derived: AtomicU64,
    worker_failures: AtomicU64,
    jobs_enqueued: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub submissions_stored: u64,
    pub artifacts_derived: u64,
    pub worker_failures: u64,
    pub jobs_enqueued: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            submissions_stored: AtomicU64::new(0),
            artifacts_derived: AtomicU64::new(0),
            worker_failures: AtomicU64::new(0),
            jobs_enqueued: AtomicU64::new(0),
        }
    }

    pub fn inc_submissions(&self) {
        self.submissions_stored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "submissions_stored", "counter incremented");
    }

    pub fn inc_derivations(&self) {
        self.artifacts_derived.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "artifacts_derived", "counter incremented");
    }

    pub fn inc_worker_failures(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "worker_failures", "counter incremented");
    }

    pub fn inc_jobs_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_enqueued", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_stored: self.submissions_stored.load(Ordering::Relaxed),
            artifacts_derived: self.artifacts_derived.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (shutdown, periodic tick) rather than
    /// on every increment.
    pub fn flush(&self) {
        let snap = self.snapshot();
        tracing::info!(
            metric = "flush",
            submissions_stored = snap.submissions_stored,
            artifacts_derived = snap.artifacts_derived,
            worker_failures = snap.worker_failures,
            jobs_enqueued = snap.jobs_enqueued,
        );
    }
}

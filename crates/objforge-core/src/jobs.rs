//! Asynchronous derive jobs.
//!
//! A fixed pool of tokio tasks drains a bounded channel of job ids and runs
//! [`Gateway::derive`] for each. Records live in memory; once more than
//! the retention limit have finished, the oldest finished ones are dropped
//! on the next enqueue. There is no cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ErrorBody, GatewayError, Result};
use crate::gateway::Gateway;
use crate::metrics::METRICS;
use crate::obs;
use crate::store::DerivedArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A queued derive request and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub stored_name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<DerivedArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Job {
    fn pending(stored_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            stored_name: stored_name.to_string(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            artifact: None,
            error: None,
        }
    }
}

type JobTable = Arc<RwLock<HashMap<Uuid, Job>>>;

/// Finished job records kept by default.
pub const DEFAULT_FINISHED_RETENTION: usize = 1024;

/// Handle to the job table and the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Uuid>,
    jobs: JobTable,
    gateway: Gateway,
    capacity: usize,
    retention: usize,
}

impl JobQueue {
    /// Start `workers` tasks (at least one) behind a channel holding up to
    /// `capacity` waiting jobs. Must be called inside a tokio runtime.
    pub fn spawn(gateway: Gateway, workers: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let jobs: JobTable = Arc::new(RwLock::new(HashMap::new()));

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let jobs = Arc::clone(&jobs);
            let gateway = gateway.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(id) = next else { break };
                    run_job(&gateway, &jobs, id).await;
                }
                debug!(worker, "job worker stopped");
            });
        }

        Self {
            tx,
            jobs,
            gateway,
            capacity,
            retention: DEFAULT_FINISHED_RETENTION,
        }
    }

    /// Keep at most `retention` finished records. Pending and running jobs
    /// are never dropped.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Queue a derive for `stored_name` and return the new job's id.
    pub async fn enqueue(&self, stored_name: &str) -> Result<Uuid> {
        let plan = self.gateway.describe(stored_name)?;
        if !self.gateway.store().exists(&plan.input_path) {
            return Err(GatewayError::SubmissionNotFound(stored_name.to_string()));
        }

        let job = Job::pending(stored_name);
        let id = job.id;
        {
            let mut table = self.jobs.write().await;
            let evicted = prune_finished(&mut table, self.retention);
            if evicted > 0 {
                debug!(evicted, retention = self.retention, "dropped finished job records");
            }
            table.insert(id, job);
        }

        if let Err(e) = self.tx.try_send(id) {
            self.jobs.write().await.remove(&id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => GatewayError::QueueFull {
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => GatewayError::QueueClosed,
            });
        }

        METRICS.inc_jobs_enqueued();
        obs::emit_job_transition(&id.to_string(), stored_name, "pending");
        Ok(id)
    }

    pub async fn status(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(GatewayError::JobNotFound(id))
    }

    /// The artifact of a succeeded job.
    pub async fn artifact(&self, id: Uuid) -> Result<DerivedArtifact> {
        let job = self.status(id).await?;
        match (job.status, job.artifact, job.error) {
            (JobStatus::Succeeded, Some(artifact), _) => Ok(artifact),
            (JobStatus::Failed, _, Some(body)) => Err(GatewayError::JobFailed { id, body }),
            (status, _, _) => Err(GatewayError::JobNotReady {
                id,
                status: status.to_string(),
            }),
        }
    }

    /// All known jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

/// Drop the oldest finished records beyond `retention`. Returns how many
/// were removed.
fn prune_finished(table: &mut HashMap<Uuid, Job>, retention: usize) -> usize {
    let mut finished: Vec<(DateTime<Utc>, Uuid)> = table
        .values()
        .filter(|j| j.status.is_terminal())
        .map(|j| (j.finished_at.unwrap_or(j.created_at), j.id))
        .collect();
    if finished.len() <= retention {
        return 0;
    }
    finished.sort_unstable();
    let excess = finished.len() - retention;
    for (_, id) in &finished[..excess] {
        table.remove(id);
    }
    excess
}

async fn run_job(gateway: &Gateway, jobs: &JobTable, id: Uuid) {
    let stored_name = {
        let mut table = jobs.write().await;
        let Some(job) = table.get_mut(&id) else { return };
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.stored_name.clone()
    };
    let job_id = id.to_string();
    obs::emit_job_transition(&job_id, &stored_name, "running");

    let outcome = gateway.derive(&stored_name).await;

    let mut table = jobs.write().await;
    let Some(job) = table.get_mut(&id) else { return };
    job.finished_at = Some(Utc::now());
    match outcome {
        Ok(artifact) => {
            job.status = JobStatus::Succeeded;
            job.artifact = Some(artifact);
        }
        Err(e) => {
            obs::emit_request_failed("job", e.status_code(), &e);
            job.status = JobStatus::Failed;
            job.error = Some(e.to_body());
        }
    }
    obs::emit_job_transition(&job_id, &stored_name, &job.status.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::store::{ArtifactStore, FsArtifactStore};
    use crate::worker::{InvocationRequest, InvocationResult, Invoker, WorkerResult};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Writes every expected output, optionally after being released.
    struct GatedInvoker {
        gate: Option<Arc<Notify>>,
        status: i32,
    }

    #[async_trait]
    impl Invoker for GatedInvoker {
        async fn invoke(&self, request: InvocationRequest) -> WorkerResult<InvocationResult> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.status == 0 {
                for path in &request.expected_outputs {
                    std::fs::write(path, b"o mesh\n").unwrap();
                }
            }
            Ok(InvocationResult {
                status: Some(self.status),
                stdout: String::new(),
                stderr: "bad input".into(),
                expected_outputs: request.expected_outputs,
                elapsed_ms: 0,
            })
        }
    }

    fn setup(invoker: GatedInvoker) -> (tempfile::TempDir, Gateway, String) {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::rooted(dir.path());
        let store = Arc::new(FsArtifactStore::from_config(&config).unwrap());
        let sub = store.put(b"jpeg", "cat.jpg").unwrap();
        let gw = Gateway::with_parts(config, store, Arc::new(invoker));
        (dir, gw, sub.stored_name)
    }

    async fn wait_until(queue: &JobQueue, id: Uuid, want: impl Fn(JobStatus) -> bool) -> Job {
        for _ in 0..200 {
            let job = queue.status(id).await.unwrap();
            if want(job.status) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached the wanted status");
    }

    #[tokio::test]
    async fn job_runs_to_success() {
        let (_dir, gw, name) = setup(GatedInvoker { gate: None, status: 0 });
        let queue = JobQueue::spawn(gw, 2, 8);

        let id = queue.enqueue(&name).await.unwrap();
        let job = wait_until(&queue, id, JobStatus::is_terminal).await;
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.started_at.is_some() && job.finished_at.is_some());

        let artifact = queue.artifact(id).await.unwrap();
        assert!(artifact.path.exists());
        assert!(artifact.file_name.ends_with("_cat.obj"));
    }

    #[tokio::test]
    async fn failed_job_reports_normalized_error() {
        let (_dir, gw, name) = setup(GatedInvoker { gate: None, status: 1 });
        let queue = JobQueue::spawn(gw, 1, 8);

        let id = queue.enqueue(&name).await.unwrap();
        let job = wait_until(&queue, id, JobStatus::is_terminal).await;
        assert_eq!(job.status, JobStatus::Failed);
        let body = job.error.unwrap();
        assert_eq!(body.error, "OBJ generation failed!");
        assert_eq!(body.details.as_deref(), Some("bad input"));

        let err = queue.artifact(id).await.unwrap_err();
        assert!(matches!(err, GatewayError::JobFailed { .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn unfinished_job_is_not_ready() {
        let gate = Arc::new(Notify::new());
        let (_dir, gw, name) = setup(GatedInvoker {
            gate: Some(Arc::clone(&gate)),
            status: 0,
        });
        let queue = JobQueue::spawn(gw, 1, 8);

        let id = queue.enqueue(&name).await.unwrap();
        let err = queue.artifact(id).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        wait_until(&queue, id, |s| s == JobStatus::Running).await;
        gate.notify_one();
        let job = wait_until(&queue, id, JobStatus::is_terminal).await;
        assert_eq!(job.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn full_queue_rejects_and_forgets_job() {
        let gate = Arc::new(Notify::new());
        let (_dir, gw, name) = setup(GatedInvoker {
            gate: Some(Arc::clone(&gate)),
            status: 0,
        });
        let queue = JobQueue::spawn(gw, 1, 1);

        let first = queue.enqueue(&name).await.unwrap();
        wait_until(&queue, first, |s| s == JobStatus::Running).await;
        let _second = queue.enqueue(&name).await.unwrap();

        let err = queue.enqueue(&name).await.unwrap_err();
        assert!(matches!(err, GatewayError::QueueFull { capacity: 1 }));
        assert_eq!(queue.list().await.len(), 2);
    }

    #[tokio::test]
    async fn finished_records_are_bounded_by_retention() {
        let (_dir, gw, name) = setup(GatedInvoker { gate: None, status: 0 });
        let queue = JobQueue::spawn(gw, 1, 8).with_retention(3);
        assert_eq!(queue.retention(), 3);

        let mut ids = Vec::new();
        for _ in 0..10 {
            let id = queue.enqueue(&name).await.unwrap();
            wait_until(&queue, id, JobStatus::is_terminal).await;
            ids.push(id);
        }

        // pruning happens before insert, so the newest job makes it retention + 1
        assert_eq!(queue.list().await.len(), 4);
        for old in &ids[..6] {
            assert!(matches!(
                queue.status(*old).await,
                Err(GatewayError::JobNotFound(_))
            ));
        }
        for recent in &ids[6..] {
            assert!(queue.status(*recent).await.is_ok());
        }
    }

    #[tokio::test]
    async fn pruning_never_drops_unfinished_jobs() {
        let gate = Arc::new(Notify::new());
        let (_dir, gw, name) = setup(GatedInvoker {
            gate: Some(Arc::clone(&gate)),
            status: 0,
        });
        let queue = JobQueue::spawn(gw, 1, 8).with_retention(0);

        let running = queue.enqueue(&name).await.unwrap();
        wait_until(&queue, running, |s| s == JobStatus::Running).await;
        let pending = queue.enqueue(&name).await.unwrap();
        let _third = queue.enqueue(&name).await.unwrap();

        assert_eq!(queue.status(running).await.unwrap().status, JobStatus::Running);
        assert_eq!(queue.status(pending).await.unwrap().status, JobStatus::Pending);
        assert_eq!(queue.list().await.len(), 3);
        gate.notify_one();
    }

    #[tokio::test]
    async fn unknown_submission_and_job_are_not_found() {
        let (_dir, gw, _name) = setup(GatedInvoker { gate: None, status: 0 });
        let queue = JobQueue::spawn(gw, 1, 4);

        let err = queue.enqueue("1_ghost.jpg").await.unwrap_err();
        assert!(matches!(err, GatewayError::SubmissionNotFound(_)));

        let err = queue.status(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
        assert_eq!(JobStatus::Running.to_string(), "running");
    }
}

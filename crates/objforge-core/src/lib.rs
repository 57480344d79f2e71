//! objforge core library
//!
//! Upload storage, engine invocation, the submit/derive gateway and its
//! error normalization, plus the asynchronous job queue built on top.

pub mod config;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod metrics;
pub mod obs;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use config::{ConfigError, EngineCommand, GatewayConfig};
pub use error::{ErrorBody, ErrorClass, GatewayError, NormalizedError, Operation, Result};
pub use gateway::{ArtifactPlan, Gateway, Upload};
pub use jobs::{Job, JobQueue, JobStatus};
pub use metrics::{MetricsSnapshot, METRICS};
pub use store::{
    content_digest, ArtifactStore, DerivedArtifact, FsArtifactStore, StagedOutput, StoreError,
    Submission,
};
pub use worker::{
    truncate_output, InvocationRequest, InvocationResult, Invoker, ProcessInvoker, WorkerError,
    WorkerResult,
};

/// Crate version, reported by the daemon's health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Gateway error taxonomy and its normalization into `{error, details}`.
//!
//! Client problems map to 4xx, storage and worker failures to 5xx. The
//! `error` headline is short and stable per kind; `details` carries raw
//! diagnostic text such as engine stderr.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::worker::WorkerError;

/// Which gateway operation drove the engine when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Submit,
    Derive,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Submit => f.write_str("submit"),
            Operation::Derive => f.write_str("derive"),
        }
    }
}

/// Errors surfaced by the gateway API.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("submission not found: {0}")]
    SubmissionNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("{operation} worker failed: {source}")]
    Worker {
        operation: Operation,
        #[source]
        source: WorkerError,
    },

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("job {id} has not finished (status {status})")]
    JobNotReady { id: Uuid, status: String },

    #[error("job {id} failed: {}", .body.error)]
    JobFailed { id: Uuid, body: ErrorBody },

    #[error("job queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("job queue is shut down")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Coarse classification: did the caller or the server get it wrong?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Client,
    Server,
}

/// Uniform failure payload returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An error reduced to what the transport needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub status: u16,
    pub class: ErrorClass,
    pub body: ErrorBody,
}

impl GatewayError {
    pub fn worker(operation: Operation, source: WorkerError) -> Self {
        GatewayError::Worker { operation, source }
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::PayloadTooLarge { .. } => 413,
            GatewayError::SubmissionNotFound(_) => 404,
            GatewayError::Storage(StoreError::InvalidName { .. }) => 400,
            GatewayError::Storage(StoreError::NotFound(_)) => 404,
            GatewayError::Storage(_) => 500,
            GatewayError::Worker { .. } => 500,
            GatewayError::JobNotFound(_) => 404,
            GatewayError::JobNotReady { .. } => 409,
            GatewayError::JobFailed { .. } => 500,
            GatewayError::QueueFull { .. } | GatewayError::QueueClosed => 503,
            GatewayError::Config(_) | GatewayError::Internal(_) => 500,
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self.status_code() < 500 {
            ErrorClass::Client
        } else {
            ErrorClass::Server
        }
    }

    /// Short, stable message for the `error` field.
    pub fn headline(&self) -> String {
        let text = match self {
            GatewayError::Validation(msg) => return msg.clone(),
            GatewayError::PayloadTooLarge { .. } => "Upload too large",
            GatewayError::SubmissionNotFound(_) | GatewayError::Storage(StoreError::NotFound(_)) => {
                "Submission not found"
            }
            GatewayError::Storage(StoreError::InvalidName { .. }) => "Invalid file name",
            GatewayError::Storage(_) => "Failed to store file",
            GatewayError::Worker {
                source: WorkerError::OutputMissing { .. },
                ..
            } => "Failed to generate OBJ file. File not found.",
            GatewayError::Worker {
                source: WorkerError::Timeout { .. },
                ..
            } => "Worker timed out",
            GatewayError::Worker {
                operation: Operation::Submit,
                ..
            } => "Point cloud generation failed!",
            GatewayError::Worker {
                operation: Operation::Derive,
                ..
            } => "OBJ generation failed!",
            GatewayError::JobNotFound(_) => "Job not found",
            GatewayError::JobNotReady { .. } => "Job not finished",
            GatewayError::JobFailed { body, .. } => return body.error.clone(),
            GatewayError::QueueFull { .. } => "Job queue is full",
            GatewayError::QueueClosed => "Job queue unavailable",
            GatewayError::Config(_) | GatewayError::Internal(_) => "Internal Server Error",
        };
        text.to_string()
    }

    /// Diagnostic text for the `details` field.
    pub fn details(&self) -> Option<String> {
        match self {
            GatewayError::Validation(_) => None,
            GatewayError::Worker { source, .. } => source.diagnostic(),
            GatewayError::Storage(StoreError::Write { source, .. }) => Some(source.to_string()),
            GatewayError::Storage(StoreError::InvalidName { reason, .. }) => {
                Some((*reason).to_string())
            }
            GatewayError::JobFailed { body, .. } => body.details.clone(),
            GatewayError::JobNotReady { status, .. } => Some(format!("status: {status}")),
            other => Some(other.to_string()),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.headline(),
            details: self.details(),
        }
    }

    pub fn normalize(&self) -> NormalizedError {
        NormalizedError {
            status: self.status_code(),
            class: self.class(),
            body: self.to_body(),
        }
    }
}

//! HTTP transport over the gateway.
//!
//! - [`routes`]: one handler per endpoint
//! - [`response`]: JSON, error and attachment responses with CORS headers
//! - [`multipart`]: upload body parsing

pub mod multipart;
pub mod response;
pub mod routes;

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Body, Method, Request, Response, StatusCode};
use objforge_core::{Gateway, JobQueue};
use tracing::debug;

use response::{cors_preflight, json_error};

/// Everything a request handler needs.
pub struct AppState {
    pub gateway: Gateway,
    pub jobs: JobQueue,
    pub max_upload_bytes: u64,
}

pub type SharedState = Arc<AppState>;

pub async fn handle(req: Request<Body>, state: SharedState) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, %path, "request");

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let response = match (&method, segments.as_slice()) {
        (&Method::OPTIONS, _) => cors_preflight(),
        (&Method::GET, [""]) => routes::index(),
        (&Method::GET, ["health"]) => routes::health(),
        (&Method::GET, ["metrics"]) => routes::metrics(),
        (&Method::POST, ["upload"]) => routes::upload(req, &state).await,
        (&Method::POST, ["generate-obj", name]) if !name.is_empty() => {
            routes::generate_obj(name, &state).await
        }
        (&Method::POST, ["jobs", name]) if !name.is_empty() => {
            routes::enqueue_job(name, &state).await
        }
        (&Method::GET, ["jobs", id]) => routes::job_status(id, &state).await,
        (&Method::GET, ["jobs", id, "artifact"]) => routes::job_artifact(id, &state).await,
        (_, ["upload"] | ["generate-obj", _] | ["health"] | ["metrics"])
        | (_, ["jobs", _] | ["jobs", _, "artifact"]) => {
            json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => json_error(StatusCode::NOT_FOUND, "Not found"),
    };
    Ok(response)
}

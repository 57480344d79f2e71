// Route handlers: upload, generate-obj, jobs, health, metrics

use hyper::body::HttpBody;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Response, StatusCode};
use objforge_core::{GatewayError, Upload, METRICS, VERSION};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::multipart::{self, MultipartError};
use super::response::{error_response, file_response, html_response, json_error, json_response};
use super::AppState;

/// Form field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "image";

const INDEX_HTML: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>objforge</title></head>
  <body>
    <h1>objforge</h1>
    <form action="/upload" method="post" enctype="multipart/form-data">
      <input type="file" name="image" accept="image/*">
      <button type="submit">Upload</button>
    </form>
    <p>Then <code>POST /generate-obj/&lt;filename&gt;</code> to download the mesh.</p>
  </body>
</html>
"#;

#[derive(Debug, Serialize)]
struct UploadResponse<'a> {
    message: &'a str,
    filename: &'a str,
    digest: &'a str,
    size: u64,
}

#[derive(Debug, Serialize)]
struct JobAccepted {
    job_id: Uuid,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

pub fn index() -> Response<Body> {
    html_response(INDEX_HTML)
}

pub fn health() -> Response<Body> {
    json_response(
        StatusCode::OK,
        &Health {
            status: "ok",
            service: "objforged",
            version: VERSION,
        },
    )
}

pub fn metrics() -> Response<Body> {
    json_response(StatusCode::OK, &METRICS.snapshot())
}

/// Buffer a request body, giving up once it exceeds `limit` bytes.
async fn read_limited(mut body: Body, limit: u64) -> Result<Vec<u8>, GatewayError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk
            .map_err(|e| GatewayError::Validation(format!("Failed to read request body: {e}")))?;
        let size = (buf.len() + chunk.len()) as u64;
        if size > limit {
            return Err(GatewayError::PayloadTooLarge { size, limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Pull the upload out of a multipart request. `Ok(None)` when there is no
/// file part named [`UPLOAD_FIELD`].
async fn extract_upload(req: Request<Body>, limit: u64) -> Result<Option<Upload>, GatewayError> {
    if let Some(declared) = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        if declared > limit {
            return Err(GatewayError::PayloadTooLarge {
                size: declared,
                limit,
            });
        }
    }

    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let boundary = match multipart::boundary(&content_type) {
        Ok(b) => b,
        Err(MultipartError::NotMultipart | MultipartError::MissingBoundary) => return Ok(None),
        Err(e) => return Err(GatewayError::Validation(e.to_string())),
    };

    let body = read_limited(req.into_body(), limit).await?;
    let parts = multipart::parse(&body, &boundary)
        .map_err(|e| GatewayError::Validation(format!("Malformed upload: {e}")))?;

    Ok(parts.into_iter().find_map(|p| match p.filename {
        Some(filename) if p.name == UPLOAD_FIELD => Some(Upload {
            filename,
            data: p.data,
        }),
        _ => None,
    }))
}

pub async fn upload(req: Request<Body>, state: &AppState) -> Response<Body> {
    let upload = match extract_upload(req, state.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(e) => return error_response("submit", &e),
    };

    match state.gateway.submit(upload).await {
        Ok(sub) => json_response(
            StatusCode::OK,
            &UploadResponse {
                message: "File processed successfully!",
                filename: &sub.stored_name,
                digest: &sub.digest,
                size: sub.size,
            },
        ),
        Err(e) => error_response("submit", &e),
    }
}

fn decode_name(raw: &str) -> Result<String, GatewayError> {
    urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .map_err(|_| GatewayError::Validation("Invalid file name".into()))
}

pub async fn generate_obj(raw_name: &str, state: &AppState) -> Response<Body> {
    let name = match decode_name(raw_name) {
        Ok(name) => name,
        Err(e) => return error_response("derive", &e),
    };
    debug!(stored_name = %name, "generate-obj requested");

    match state.gateway.derive(&name).await {
        Ok(artifact) => file_response("derive", &artifact.path, &artifact.file_name).await,
        Err(e) => error_response("derive", &e),
    }
}

pub async fn enqueue_job(raw_name: &str, state: &AppState) -> Response<Body> {
    let name = match decode_name(raw_name) {
        Ok(name) => name,
        Err(e) => return error_response("enqueue", &e),
    };
    match state.jobs.enqueue(&name).await {
        Ok(job_id) => json_response(
            StatusCode::ACCEPTED,
            &JobAccepted {
                job_id,
                status: "pending",
            },
        ),
        Err(e) => error_response("enqueue", &e),
    }
}

fn parse_job_id(raw: &str) -> Result<Uuid, Response<Body>> {
    Uuid::parse_str(raw).map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid job id"))
}

pub async fn job_status(raw_id: &str, state: &AppState) -> Response<Body> {
    let id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.jobs.status(id).await {
        Ok(job) => json_response(StatusCode::OK, &job),
        Err(e) => error_response("job_status", &e),
    }
}

pub async fn job_artifact(raw_id: &str, state: &AppState) -> Response<Body> {
    let id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.jobs.artifact(id).await {
        Ok(artifact) => file_response("job_artifact", &artifact.path, &artifact.file_name).await,
        Err(e) => error_response("job_artifact", &e),
    }
}

// HTTP response helpers shared by the route handlers

use std::path::Path;

use hyper::header::{self, HeaderValue};
use hyper::{Body, Response, StatusCode};
use objforge_core::obs;
use objforge_core::{ErrorBody, GatewayError};
use serde::Serialize;
use tokio_util::io::ReaderStream;

/// Standard CORS headers
const CORS_ORIGIN: &str = "*";
const CORS_METHODS: &str = "GET, POST, OPTIONS";
const CORS_HEADERS: &str = "content-type, authorization";

fn with_cors(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_HEADERS),
    );
    response
}

fn with_status(body: Body, status: StatusCode, content_type: &'static str) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    with_cors(response)
}

/// Build a JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());
    with_status(Body::from(json), status, "application/json")
}

/// Build a JSON error response without details
pub fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    json_response(
        status,
        &ErrorBody {
            error: message.to_string(),
            details: None,
        },
    )
}

/// Normalize a gateway error into its `{error, details}` response.
pub fn error_response(op: &str, err: &GatewayError) -> Response<Body> {
    let normalized = err.normalize();
    obs::emit_request_failed(op, normalized.status, err);
    let status =
        StatusCode::from_u16(normalized.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &normalized.body)
}

pub fn html_response(html: &'static str) -> Response<Body> {
    with_status(Body::from(html), StatusCode::OK, "text/html; charset=utf-8")
}

/// CORS preflight response
pub fn cors_preflight() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    with_cors(response)
}

/// `attachment; filename="..."`, dropping characters that cannot appear in a
/// quoted header parameter.
fn content_disposition(download_name: &str) -> HeaderValue {
    let safe: String = download_name
        .chars()
        .filter(|c| (c.is_ascii_graphic() && *c != '"' && *c != '\\') || *c == ' ')
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Stream a file as an octet-stream attachment.
pub async fn file_response(op: &str, path: &Path, download_name: &str) -> Response<Body> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            let err = GatewayError::Internal(format!("failed to open {}: {e}", path.display()));
            return error_response(op, &err);
        }
    };
    let len = file.metadata().await.map(|m| m.len()).ok();

    let mut response = with_status(
        Body::wrap_stream(ReaderStream::new(file)),
        StatusCode::OK,
        "application/octet-stream",
    );
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(download_name));
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    response
}

//! HLS playlist and segment serving

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;
use undertow_core::StreamId;
use undertow_core::streams::{SegmentError, validate_file_name};

use super::ApiError;
use crate::server::AppState;

const ALLOW_METHODS: &str = "GET, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";

/// Content type for a playlist or segment file.
pub fn content_type_for(file_name: &str) -> String {
    match FsPath::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        _ => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string(),
    }
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}

/// `OPTIONS /hls/{id}/{file}`: CORS preflight, empty `200`.
pub async fn hls_preflight() -> Response {
    with_cors(StatusCode::OK.into_response())
}

/// `GET /hls/{id}/{file}` streams a file from the stream's working directory.
///
/// Files are served while the stream is still transcoding; a segment the
/// transcoder has not written yet is a `404`.
///
/// # Errors
/// - `400` - File name escapes the working directory
/// - `404` - Unknown stream, no servable directory, or missing file
pub async fn serve_hls_file(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(String, String)>,
) -> Response {
    with_cors(match open_hls_file(&state, &id, &file_name).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    })
}

async fn open_hls_file(state: &AppState, id: &str, file_name: &str) -> Result<Response, ApiError> {
    validate_file_name(file_name).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let id: StreamId = id
        .parse()
        .map_err(|_| ApiError::not_found(format!("Stream {id} not found")))?;

    let path = state
        .orchestrator
        .segment_path(id, file_name)
        .map_err(|e| match e {
            SegmentError::InvalidFileName { .. } => ApiError::bad_request(e.to_string()),
            SegmentError::StreamNotFound { .. } | SegmentError::NotAvailable { .. } => {
                ApiError::not_found(e.to_string())
            }
        })?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!("{file_name} not found")));
        }
        Err(e) => {
            tracing::warn!("Stream {}: failed to open {}: {}", id, path.display(), e);
            return Err(ApiError::internal("Failed to open file"));
        }
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found(format!("{file_name} not found")));
    }

    tracing::debug!("Stream {}: serving {} ({} bytes)", id, file_name, metadata.len());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(file_name))
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(e.to_string()))
}

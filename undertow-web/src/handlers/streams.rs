//! Stream submission, status and eviction endpoints

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use undertow_core::{OrchestratorError, SourceError, StreamId, StreamRecord, StreamState};

use super::ApiError;
use crate::server::AppState;

/// Reply to `GET /add`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStreamResponse {
    pub stream_id: StreamId,
    pub hls_url: String,
    pub status: StreamState,
}

/// Status view of one stream.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub stream_id: StreamId,
    pub hls_url: String,
    pub status: StreamState,
    pub descriptor: String,
    pub payload_name: Option<String>,
    pub payload_length: Option<u64>,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamStatus {
    fn from_record(state: &AppState, record: StreamRecord) -> Self {
        Self {
            stream_id: record.id,
            hls_url: playlist_url(state, record.id),
            status: record.state,
            descriptor: record.descriptor,
            payload_name: record.payload.as_ref().map(|p| p.name.clone()),
            payload_length: record.payload.as_ref().map(|p| p.length),
            error: record.last_error.as_ref().map(ToString::to_string),
            error_kind: record.last_error.as_ref().map(|e| e.kind()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn playlist_url(state: &AppState, id: StreamId) -> String {
    format!(
        "{}/hls/{}/{}",
        state.base_url,
        id,
        state.orchestrator.playlist_name()
    )
}

fn parse_stream_id(raw: &str) -> Result<StreamId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("Stream {raw} not found")))
}

/// `GET /add?magnet=` starts a stream and returns where its playlist will be.
///
/// # Errors
/// - `400` - Missing or malformed descriptor
/// - `503` - Server shutting down
/// - `500` - Any other setup failure
pub async fn add_stream(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AddStreamResponse>, ApiError> {
    let descriptor = params
        .get("magnet")
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'magnet' query parameter"))?;

    match state.orchestrator.submit(descriptor).await {
        Ok(record) => Ok(Json(AddStreamResponse {
            stream_id: record.id,
            hls_url: playlist_url(&state, record.id),
            status: record.state,
        })),
        Err(OrchestratorError::Source(e @ SourceError::InvalidDescriptor { .. })) => {
            Err(ApiError::bad_request(e.to_string()))
        }
        Err(OrchestratorError::ShuttingDown) => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Server is shutting down",
        )),
        Err(e) => {
            tracing::error!("Failed to start stream: {}", e);
            Err(ApiError::internal(format!("Failed to start stream: {e}")))
        }
    }
}

/// `GET /streams`
pub async fn list_streams(State(state): State<AppState>) -> Json<Vec<StreamStatus>> {
    let streams = state
        .orchestrator
        .list()
        .into_iter()
        .map(|record| StreamStatus::from_record(&state, record))
        .collect();
    Json(streams)
}

/// `GET /streams/{id}`
///
/// # Errors
/// - `404` - Unknown stream
pub async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StreamStatus>, ApiError> {
    let id = parse_stream_id(&id)?;
    let record = state
        .orchestrator
        .get(id)
        .ok_or_else(|| ApiError::not_found(format!("Stream {id} not found")))?;
    Ok(Json(StreamStatus::from_record(&state, record)))
}

/// `DELETE /streams/{id}` stops the stream and deletes its files.
///
/// # Errors
/// - `404` - Unknown stream
pub async fn delete_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_stream_id(&id)?;
    match state.orchestrator.evict(id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(OrchestratorError::StreamNotFound { .. }) => {
            Err(ApiError::not_found(format!("Stream {id} not found")))
        }
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "streams": state.orchestrator.stream_count(),
    }))
}

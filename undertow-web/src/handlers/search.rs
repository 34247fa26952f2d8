//! Metadata search proxy

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Query, State};
use undertow_search::SearchResult;

use super::ApiError;
use crate::server::AppState;

/// `GET /search?q=` returns matching titles, `[]` when nothing matched.
///
/// # Errors
/// - `400` - Missing or empty `q`
/// - `500` - Provider failure
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let query = params
        .get("q")
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'q' query parameter"))?;

    match state.search.search(query).await {
        Ok(results) => Ok(Json(results)),
        Err(e) => {
            tracing::error!("Search for '{}' failed: {}", query, e);
            Err(ApiError::internal("Failed to fetch search results."))
        }
    }
}

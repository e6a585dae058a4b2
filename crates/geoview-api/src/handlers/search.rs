//! Keyword search endpoint.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use geoview_core::AppError;
use serde::Deserialize;
use serde_json::json;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub async fn search_tables(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, HttpAppError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| {
            HttpAppError(AppError::InvalidInput(
                "Query parameter 'q' is required".to_string(),
            ))
        })?;

    let results = state.search.search(query).await?;
    Ok(Json(json!({
        "query": query,
        "count": results.len(),
        "results": results,
    })))
}

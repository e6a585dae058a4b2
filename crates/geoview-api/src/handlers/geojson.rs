//! GeoJSON endpoint: one FeatureCollection per spatial table.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::constants::GEOJSON_FEATURE_LIMIT;
use crate::error::HttpAppError;
use crate::handlers::resolve_table;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GeoJsonParams {
    /// Case-insensitive substring filter across the table's text columns.
    pub q: Option<String>,
}

pub async fn table_geojson(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<GeoJsonParams>,
) -> Result<impl IntoResponse, HttpAppError> {
    let columns = resolve_table(&state, &table).await?;
    let Some(geometry_col) = geoview_db::find_geometry_column(&columns) else {
        return Err(HttpAppError(geoview_core::AppError::BadRequest(format!(
            "Table '{}' has no geometry column",
            table
        ))));
    };

    let filter = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());
    let collection = state
        .features
        .geojson(
            &table,
            &columns,
            &geometry_col.name,
            filter,
            GEOJSON_FEATURE_LIMIT,
        )
        .await?;

    Ok(Json(collection))
}

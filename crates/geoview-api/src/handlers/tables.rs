//! Table listing, attribute grids, and bounds.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::constants::{DEFAULT_GRID_ROWS, MAX_GRID_ROWS};
use crate::error::HttpAppError;
use crate::handlers::resolve_table;
use crate::state::AppState;

/// Overview of every user table.
pub async fn list_tables(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, HttpAppError> {
    let tables = state.schema.table_overview().await?;
    Ok(Json(json!({
        "count": tables.len(),
        "tables": tables,
    })))
}

#[derive(Debug, Deserialize)]
pub struct GridParams {
    pub limit: Option<i64>,
}

/// First rows of a table as JSON objects, geometry rendered as WKT.
pub async fn table_grid(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<GridParams>,
) -> Result<impl IntoResponse, HttpAppError> {
    let columns = resolve_table(&state, &table).await?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_GRID_ROWS)
        .clamp(1, MAX_GRID_ROWS);

    let grid = state.features.grid(&table, &columns, limit).await?;
    let total_rows = state.schema.row_count(&table).await?;
    let returned_rows = grid.rows.len();

    Ok(Json(json!({
        "table": table,
        "columns": grid.columns,
        "rows": grid.rows,
        "returned_rows": returned_rows,
        "total_rows": total_rows,
    })))
}

/// Extent of a table's geometry, for fitting the initial viewport.
/// `bounds` is null when the table has no non-NULL geometry.
pub async fn table_bounds(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let columns = resolve_table(&state, &table).await?;
    let Some(geometry_col) = geoview_db::find_geometry_column(&columns) else {
        return Err(HttpAppError(geoview_core::AppError::BadRequest(format!(
            "Table '{}' has no geometry column",
            table
        ))));
    };

    let bounds = state.features.bounds(&table, &geometry_col.name).await?;
    let total_rows = state.schema.row_count(&table).await?;
    Ok(Json(json!({
        "table": table,
        "bounds": bounds,
        "total_rows": total_rows,
    })))
}

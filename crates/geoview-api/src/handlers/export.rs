//! Shapefile export: a spatial table back out as a zipped shapefile.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use geoview_core::AppError;

use crate::error::HttpAppError;
use crate::handlers::resolve_table;
use crate::services::shapefile_export::build_shapefile_zip;
use crate::state::AppState;

pub async fn export_shapefile(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let columns = resolve_table(&state, &table).await?;
    let Some(geometry_col) = geoview_db::find_geometry_column(&columns) else {
        return Err(HttpAppError(AppError::BadRequest(format!(
            "Table '{}' has no geometry column",
            table
        ))));
    };

    let rows = state
        .features
        .export_rows(&table, &columns, &geometry_col.name)
        .await?;
    if rows.is_empty() {
        return Err(HttpAppError(AppError::NotFound(format!(
            "Table '{}' has no rows to export",
            table
        ))));
    }

    // Shapefile writing is synchronous disk work.
    let table_for_task = table.clone();
    let archive = tokio::task::spawn_blocking(move || {
        build_shapefile_zip(&table_for_task, &columns, &rows)
    })
    .await
    .map_err(|err| AppError::Internal(format!("Export task failed: {}", err)))?
    .map_err(|err| AppError::Internal(format!("Export failed: {:#}", err)))?;

    tracing::info!(table = %table, bytes = archive.len(), "Exported shapefile");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.zip\"", table),
            ),
        ],
        archive,
    ))
}

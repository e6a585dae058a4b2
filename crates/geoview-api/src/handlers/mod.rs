pub mod export;
pub mod geojson;
pub mod health;
pub mod search;
pub mod tables;
pub mod upload;

use geoview_core::AppError;
use geoview_db::ColumnInfo;

use crate::error::HttpAppError;
use crate::state::AppState;

/// Resolve a table the client named: 404 unless it exists in the catalog.
/// Every handler that interpolates a table identifier goes through here,
/// so only catalog-verified names reach SQL.
pub(crate) async fn resolve_table(
    state: &AppState,
    table: &str,
) -> Result<Vec<ColumnInfo>, HttpAppError> {
    if !state
        .schema
        .table_exists(table)
        .await
        .map_err(HttpAppError::from)?
    {
        return Err(HttpAppError(AppError::NotFound(format!(
            "Table '{}' not found",
            table
        ))));
    }
    state.schema.columns(table).await.map_err(HttpAppError::from)
}

//! Shapefile archive upload.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use geoview_core::AppError;
use serde_json::json;

use crate::error::HttpAppError;
use crate::state::AppState;

/// `POST /api/upload`: multipart form with a required `file` part (the
/// zipped shapefile) and an optional `name` part (preferred table name).
pub async fn upload_shapefile(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut preferred_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err.to_string()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| multipart_error(err.to_string()))?;
                file = Some((filename, data));
            }
            Some("name") => {
                preferred_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| multipart_error(err.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let (filename, payload) = file.ok_or_else(|| {
        HttpAppError(AppError::InvalidInput("No file selected".to_string()))
    })?;
    if filename.is_empty() {
        return Err(HttpAppError(AppError::InvalidInput(
            "No file selected".to_string(),
        )));
    }

    tracing::info!(
        filename = %filename,
        bytes = payload.len(),
        "Received shapefile upload"
    );

    let report = state
        .ingestor
        .ingest(payload, &filename, preferred_name.as_deref())
        .await
        .map_err(HttpAppError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!(
                "Imported {} features into '{}'",
                report.feature_count, report.table_name
            ),
            "table_name": report.table_name,
            "feature_count": report.feature_count,
            "crs": report.crs,
        })),
    ))
}

/// Body-limit violations surface as multipart read failures; everything
/// else about a broken multipart stream is the client's request.
fn multipart_error(message: String) -> HttpAppError {
    let app = if message.to_lowercase().contains("length limit") {
        AppError::PayloadTooLarge("Uploaded archive exceeds the size limit".to_string())
    } else {
        AppError::InvalidInput(format!("Invalid multipart request: {}", message))
    };
    HttpAppError(app)
}

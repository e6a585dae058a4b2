//! Route table and request-wide layers.

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Result<Router> {
    let cors = cors_layer(&state.config.cors_origins)?;
    let max_upload = state.config.max_upload_size_bytes;

    let router = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/tables", get(handlers::tables::list_tables))
        .route("/api/tables/{table}", get(handlers::tables::table_grid))
        .route(
            "/api/tables/{table}/bounds",
            get(handlers::tables::table_bounds),
        )
        .route(
            "/api/tables/{table}/shapefile",
            get(handlers::export::export_shapefile),
        )
        .route("/api/geojson/{table}", get(handlers::geojson::table_geojson))
        .route("/api/search", get(handlers::search::search_tables))
        .route("/api/upload", post(handlers::upload::upload_shapefile))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(router)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    if origins.iter().any(|origin| origin == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<Result<_>>()?;

    Ok(CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any))
}

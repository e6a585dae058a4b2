pub mod database;
pub mod routes;
pub mod server;

use anyhow::Result;
use axum::Router;
use geoview_core::AppConfig;

use crate::state::AppState;

/// Wire up the database pool, shared state, and router.
pub async fn initialize_app(config: AppConfig) -> Result<(AppState, Router)> {
    let pool = database::setup_database(&config).await?;
    let state = AppState::new(config, pool);
    let router = routes::build_router(state.clone())?;
    Ok((state, router))
}

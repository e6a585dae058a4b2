use std::sync::Arc;

use geoview_core::AppConfig;
use geoview_db::{FeatureRepository, SchemaRepository, SearchRepository};
use geoview_ingest::ShapefileIngestor;
use sqlx::PgPool;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: PgPool,
    pub schema: SchemaRepository,
    pub features: FeatureRepository,
    pub search: SearchRepository,
    pub ingestor: Arc<ShapefileIngestor>,
}

impl AppState {
    pub fn new(config: AppConfig, pool: PgPool) -> Self {
        let ingestor = Arc::new(ShapefileIngestor::new(pool.clone(), &config));
        Self {
            config: Arc::new(config),
            schema: SchemaRepository::new(pool.clone()),
            features: FeatureRepository::new(pool.clone()),
            search: SearchRepository::new(pool.clone()),
            ingestor,
            pool,
        }
    }
}

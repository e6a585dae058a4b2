//! The ingestion pipeline itself.

use bytes::Bytes;
use geoview_core::models::Crs;
use geoview_core::AppConfig;
use geoview_db::SchemaRepository;
use sqlx::PgPool;

use crate::crs::CrsNormalizer;
use crate::error::IngestError;
use crate::locate::locate;
use crate::namer::derive_table_name;
use crate::reader::read_feature_set;
use crate::stage::{stage, StagedArchive};
use crate::writer::{SpatialTableWriter, WriteOutcome};

/// What an upload produced, returned to the client verbatim.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReport {
    pub table_name: String,
    pub feature_count: u64,
    /// CRS the table ended up in, e.g. `EPSG:4326`.
    pub crs: Option<String>,
}

/// Runs uploaded archives through staging, location, naming,
/// normalization, and writing.
pub struct ShapefileIngestor {
    schema: SchemaRepository,
    writer: SpatialTableWriter,
    normalizer: CrsNormalizer,
    scratch_dir: std::path::PathBuf,
}

impl ShapefileIngestor {
    pub fn new(pool: PgPool, config: &AppConfig) -> Self {
        Self {
            schema: SchemaRepository::new(pool.clone()),
            writer: SpatialTableWriter::new(pool, config.default_srid),
            normalizer: CrsNormalizer::new(config.default_srid),
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    /// Import one uploaded archive. Scratch files are removed on every
    /// path out of here, success or failure.
    pub async fn ingest(
        &self,
        payload: Bytes,
        filename: &str,
        preferred_name: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        let staged = stage(&payload, filename, &self.scratch_dir)?;
        let result = self.run(&staged, preferred_name).await;
        match &result {
            Ok(report) => tracing::info!(
                table = %report.table_name,
                features = report.feature_count,
                crs = ?report.crs,
                "Import finished"
            ),
            Err(err) => tracing::warn!(
                filename = %filename,
                error = %err,
                "Import failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        staged: &StagedArchive,
        preferred_name: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        let payload = locate(staged)?;

        // Shapefile parsing is synchronous disk work; keep it off the
        // async workers.
        let shp_path = payload.shp_path.clone();
        let mut feature_set = tokio::task::spawn_blocking(move || read_feature_set(&shp_path))
            .await
            .map_err(|err| IngestError::Processing(format!("Parser task failed: {}", err)))??;

        let existing = self
            .schema
            .table_names_snapshot()
            .await
            .map_err(|err| IngestError::Import(format!("{:#}", err)))?;
        let table_name =
            derive_table_name(preferred_name, staged.original_filename(), &existing);

        self.normalizer.normalize(&mut feature_set)?;
        let outcome = self.writer.write(&feature_set, &table_name).await?;

        Ok(build_report(table_name, &outcome, feature_set.crs.as_ref()))
    }
}

/// Report the CRS the table is stored in. After a degraded import (the
/// normalizer could not reproject) the feature set still carries its
/// declared CRS, but the written column is tagged with the target SRID;
/// the report follows the column.
fn build_report(table_name: String, outcome: &WriteOutcome, declared: Option<&Crs>) -> IngestReport {
    let stored = format!("EPSG:{}", outcome.srid);
    if let Some(name) = declared.and_then(Crs::display_name) {
        if name != stored {
            tracing::warn!(
                declared = %name,
                stored = %stored,
                "Coordinates were imported unnormalized; the table's SRID tag does not match them"
            );
        }
    }
    IngestReport {
        table_name,
        feature_count: outcome.feature_count,
        crs: Some(stored),
    }
}

//! Spatial table writing.
//!
//! Two strategies produce the same table shape. The primary strategy
//! streams CSV through `COPY FROM STDIN` with EWKT geometry literals.
//! Some managed Postgres offerings and poolers reject the COPY protocol,
//! so a fallback loads rows into a staging table with bound INSERTs and
//! converts it with `CREATE TABLE AS ... ST_GeomFromText`. Which one runs
//! is decided by a one-time probe per pool.

use async_trait::async_trait;
use geo_types::Geometry;
use geoview_core::models::{AttrKind, AttrValue, FeatureSet};
use geoview_db::quote_ident;
use sqlx::postgres::PgPoolCopyExt;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use uuid::Uuid;
use wkt::ToWkt;

use crate::error::IngestError;

/// Upper bound on bind parameters per INSERT batch in the fallback path.
const MAX_BIND_PARAMS: usize = 800;
/// Rows per CSV buffer flush in the COPY path.
const COPY_FLUSH_ROWS: usize = 500;

/// What the writer did, for the result report.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub feature_count: u64,
    pub srid: u32,
}

/// A way of materializing a [`FeatureSet`] as a spatial table.
#[async_trait]
trait TableWriteStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn write(
        &self,
        pool: &PgPool,
        table: &str,
        feature_set: &FeatureSet,
        srid: u32,
    ) -> anyhow::Result<()>;
}

/// Writes spatial tables, choosing a strategy per the pool's COPY support.
pub struct SpatialTableWriter {
    pool: PgPool,
    srid: u32,
    copy_supported: OnceCell<bool>,
}

impl SpatialTableWriter {
    pub fn new(pool: PgPool, srid: u32) -> Self {
        Self {
            pool,
            srid,
            copy_supported: OnceCell::new(),
        }
    }

    /// Replace `table` with the feature set's contents.
    pub async fn write(
        &self,
        feature_set: &FeatureSet,
        table: &str,
    ) -> Result<WriteOutcome, IngestError> {
        if feature_set.is_empty() {
            return Err(IngestError::NoFeatures);
        }

        let strategy: &dyn TableWriteStrategy = if self.copy_supported().await {
            &BulkCopyWriter
        } else {
            &WktStagingWriter
        };
        tracing::debug!(
            table = %table,
            strategy = strategy.name(),
            features = feature_set.len(),
            "Writing spatial table"
        );

        strategy
            .write(&self.pool, table, feature_set, self.srid)
            .await
            .map_err(classify_db_error)?;

        Ok(WriteOutcome {
            feature_count: feature_set.len() as u64,
            srid: self.srid,
        })
    }

    /// Probe COPY support once per pool. The probe also makes the one
    /// best-effort attempt to enable PostGIS, so both happen before the
    /// first import touches a user table.
    async fn copy_supported(&self) -> bool {
        *self
            .copy_supported
            .get_or_init(|| async {
                ensure_spatial_extension(&self.pool).await;
                match probe_copy_support(&self.pool).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "COPY protocol unavailable; falling back to staged WKT inserts"
                        );
                        false
                    }
                }
            })
            .await
    }
}

/// `CREATE EXTENSION IF NOT EXISTS postgis`, warning instead of failing:
/// on hosted databases the extension is often preinstalled but the app
/// role lacks the privilege to run CREATE EXTENSION.
async fn ensure_spatial_extension(pool: &PgPool) {
    if let Err(err) = sqlx::query("CREATE EXTENSION IF NOT EXISTS postgis")
        .execute(pool)
        .await
    {
        tracing::warn!(
            error = %err,
            "Could not enable the PostGIS extension; assuming it is already installed"
        );
    }
}

/// Round-trip one row through COPY on a temp table.
async fn probe_copy_support(pool: &PgPool) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;
    sqlx::query("CREATE TEMP TABLE IF NOT EXISTS copy_probe (v text)")
        .execute(&mut *conn)
        .await?;

    let result: anyhow::Result<()> = async {
        let mut sink = conn
            .copy_in_raw("COPY copy_probe (v) FROM STDIN WITH (FORMAT csv)")
            .await?;
        sink.send("probe\n".as_bytes()).await?;
        sink.finish().await?;
        Ok(())
    }
    .await;

    // The temp table lives as long as the pooled session does; drop it
    // so the connection goes back clean.
    let _ = sqlx::query("DROP TABLE IF EXISTS copy_probe")
        .execute(&mut *conn)
        .await;

    result
}

/// Primary strategy: typed table up front, CSV streamed through COPY,
/// geometry as `SRID=n;WKT` literals.
struct BulkCopyWriter;

#[async_trait]
impl TableWriteStrategy for BulkCopyWriter {
    fn name(&self) -> &'static str {
        "bulk-copy"
    }

    async fn write(
        &self,
        pool: &PgPool,
        table: &str,
        feature_set: &FeatureSet,
        srid: u32,
    ) -> anyhow::Result<()> {
        let quoted = quote_ident(table);

        let mut column_defs: Vec<String> = feature_set
            .columns
            .iter()
            .map(|col| format!("{} {}", quote_ident(&col.name), col.kind.sql_type()))
            .collect();
        column_defs.push(format!("\"geometry\" geometry(Geometry, {})", srid));

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted))
            .execute(pool)
            .await?;
        sqlx::query(&format!("CREATE TABLE {} ({})", quoted, column_defs.join(", ")))
            .execute(pool)
            .await?;

        let result = self.copy_rows(pool, &quoted, feature_set, srid).await;
        if result.is_err() {
            // Do not leave a half-loaded table behind.
            let _ = sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted))
                .execute(pool)
                .await;
        }
        result
    }
}

impl BulkCopyWriter {
    async fn copy_rows(
        &self,
        pool: &PgPool,
        quoted_table: &str,
        feature_set: &FeatureSet,
        srid: u32,
    ) -> anyhow::Result<()> {
        let mut column_list: Vec<String> = feature_set
            .columns
            .iter()
            .map(|col| quote_ident(&col.name))
            .collect();
        column_list.push("\"geometry\"".to_string());

        let statement = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv)",
            quoted_table,
            column_list.join(", ")
        );
        let mut sink = pool.copy_in_raw(&statement).await?;

        let mut buffer = String::new();
        for (index, row) in feature_set.rows.iter().enumerate() {
            encode_csv_row(&mut buffer, row.geometry.as_ref(), &row.values, srid);
            if (index + 1) % COPY_FLUSH_ROWS == 0 {
                sink.send(buffer.as_bytes()).await?;
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            sink.send(buffer.as_bytes()).await?;
        }
        sink.finish().await?;
        Ok(())
    }
}

/// Fallback strategy: bound INSERTs into a text staging table, then
/// `CREATE TABLE AS SELECT ... ST_GeomFromText(...)` plus a GIST index.
struct WktStagingWriter;

#[async_trait]
impl TableWriteStrategy for WktStagingWriter {
    fn name(&self) -> &'static str {
        "wkt-staging"
    }

    async fn write(
        &self,
        pool: &PgPool,
        table: &str,
        feature_set: &FeatureSet,
        srid: u32,
    ) -> anyhow::Result<()> {
        let staging = staging_table_name(table);
        let quoted_staging = quote_ident(&staging);

        let result = self
            .load_and_convert(pool, table, &quoted_staging, feature_set, srid)
            .await;

        let _ = sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted_staging))
            .execute(pool)
            .await;
        result
    }
}

impl WktStagingWriter {
    async fn load_and_convert(
        &self,
        pool: &PgPool,
        table: &str,
        quoted_staging: &str,
        feature_set: &FeatureSet,
        srid: u32,
    ) -> anyhow::Result<()> {
        let quoted = quote_ident(table);

        let mut staging_defs: Vec<String> = feature_set
            .columns
            .iter()
            .map(|col| format!("{} {}", quote_ident(&col.name), col.kind.sql_type()))
            .collect();
        staging_defs.push("\"wkt_geometry\" text".to_string());

        sqlx::query(&format!(
            "CREATE TABLE {} ({})",
            quoted_staging,
            staging_defs.join(", ")
        ))
        .execute(pool)
        .await?;

        self.insert_batches(pool, quoted_staging, feature_set).await?;

        let attr_list: Vec<String> = feature_set
            .columns
            .iter()
            .map(|col| quote_ident(&col.name))
            .collect();
        let select_list = if attr_list.is_empty() {
            format!(
                "ST_GeomFromText(\"wkt_geometry\", {}) AS \"geometry\"",
                srid
            )
        } else {
            format!(
                "{}, ST_GeomFromText(\"wkt_geometry\", {}) AS \"geometry\"",
                attr_list.join(", "),
                srid
            )
        };

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted))
            .execute(pool)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {} AS SELECT {} FROM {}",
            quoted, select_list, quoted_staging
        ))
        .execute(pool)
        .await?;

        // CREATE TABLE AS leaves the geometry column unconstrained; pin
        // the typmod so both strategies produce the same schema.
        sqlx::query(&format!(
            "ALTER TABLE {} ALTER COLUMN \"geometry\" TYPE geometry(Geometry, {})",
            quoted, srid
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX {} ON {} USING GIST (\"geometry\")",
            quote_ident(&format!("{}_geometry_idx", table)),
            quoted
        ))
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn insert_batches(
        &self,
        pool: &PgPool,
        quoted_staging: &str,
        feature_set: &FeatureSet,
    ) -> anyhow::Result<()> {
        let params_per_row = feature_set.columns.len() + 1;
        let rows_per_batch = (MAX_BIND_PARAMS / params_per_row).max(1);

        let mut column_list: Vec<String> = feature_set
            .columns
            .iter()
            .map(|col| quote_ident(&col.name))
            .collect();
        column_list.push("\"wkt_geometry\"".to_string());

        for batch in feature_set.rows.chunks(rows_per_batch) {
            let placeholders: Vec<String> = (0..batch.len())
                .map(|row_index| {
                    let slots: Vec<String> = (0..params_per_row)
                        .map(|slot| format!("${}", row_index * params_per_row + slot + 1))
                        .collect();
                    format!("({})", slots.join(", "))
                })
                .collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quoted_staging,
                column_list.join(", "),
                placeholders.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for row in batch {
                for (column, value) in feature_set.columns.iter().zip(&row.values) {
                    query = bind_attr(query, column.kind, value);
                }
                query = query.bind(row.geometry.as_ref().map(|g| g.wkt_string()));
            }
            query.execute(pool).await?;
        }
        Ok(())
    }
}

/// Staging table name for the fallback path: random suffix so it can
/// never collide with an imported table, base truncated so the whole
/// name stays inside Postgres's 63-byte identifier limit.
fn staging_table_name(table: &str) -> String {
    let base: String = table.chars().take(50).collect();
    let token = Uuid::new_v4().simple().to_string();
    format!("{}_stg_{}", base, &token[..8])
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

/// Bind one attribute value, typing NULLs by the column's kind.
fn bind_attr<'a>(query: PgQuery<'a>, kind: AttrKind, value: &'a AttrValue) -> PgQuery<'a> {
    match value {
        AttrValue::Text(text) => query.bind(text.clone()),
        AttrValue::Number(number) => query.bind(*number),
        AttrValue::Bool(flag) => query.bind(*flag),
        AttrValue::Date(date) => query.bind(*date),
        AttrValue::Null => match kind {
            AttrKind::Text => query.bind(None::<String>),
            AttrKind::Number => query.bind(None::<f64>),
            AttrKind::Bool => query.bind(None::<bool>),
            AttrKind::Date => query.bind(None::<chrono::NaiveDate>),
        },
    }
}

/// Append one CSV record: attribute cells in column order, then the
/// geometry as an EWKT literal. An empty unquoted cell is NULL in
/// Postgres CSV, which is exactly what missing values need.
fn encode_csv_row(
    buffer: &mut String,
    geometry: Option<&Geometry<f64>>,
    values: &[AttrValue],
    srid: u32,
) {
    for value in values {
        match value {
            AttrValue::Text(text) => buffer.push_str(&csv_quote(text)),
            AttrValue::Number(number) => buffer.push_str(&number.to_string()),
            AttrValue::Bool(flag) => buffer.push_str(if *flag { "true" } else { "false" }),
            AttrValue::Date(date) => buffer.push_str(&date.format("%Y-%m-%d").to_string()),
            AttrValue::Null => {}
        }
        buffer.push(',');
    }
    if let Some(geometry) = geometry {
        buffer.push_str(&format!("\"SRID={};{}\"", srid, geometry.wkt_string()));
    }
    buffer.push('\n');
}

/// Quote a CSV cell unconditionally, so empty strings stay distinct from
/// NULL and embedded commas, quotes, and newlines survive.
fn csv_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Decide whether a database error means "PostGIS is not installed".
fn is_spatial_extension_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("type \"geometry\" does not exist")
        || lower.contains("function st_geomfromtext")
        || lower.contains("extension \"postgis\"")
}

fn classify_db_error(err: anyhow::Error) -> IngestError {
    let message = format!("{:#}", err);
    if is_spatial_extension_error(&message) {
        IngestError::SpatialExtensionMissing(
            "PostGIS is not installed on the target database".to_string(),
        )
    } else {
        IngestError::Import(message)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use geo_types::point;

    use super::*;

    #[test]
    fn test_csv_row_with_all_kinds() {
        let mut buffer = String::new();
        let geometry: Geometry<f64> = point!(x: 1.0, y: 2.0).into();
        encode_csv_row(
            &mut buffer,
            Some(&geometry),
            &[
                AttrValue::Text("River Park".to_string()),
                AttrValue::Number(12.5),
                AttrValue::Bool(true),
                AttrValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
            ],
            4326,
        );
        assert_eq!(
            buffer,
            "\"River Park\",12.5,true,2024-03-09,\"SRID=4326;POINT(1 2)\"\n"
        );
    }

    #[test]
    fn test_csv_null_and_empty_are_distinct() {
        let mut buffer = String::new();
        encode_csv_row(
            &mut buffer,
            None,
            &[AttrValue::Null, AttrValue::Text(String::new())],
            4326,
        );
        // Unquoted empty cell is NULL; quoted empty cell is ''.
        assert_eq!(buffer, ",\"\",\n");
    }

    #[test]
    fn test_csv_quoting_escapes_embedded_quotes_and_commas() {
        assert_eq!(csv_quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(csv_quote("x,y"), "\"x,y\"");
    }

    #[test]
    fn test_staging_names_are_unique_per_run() {
        let first = staging_table_name("roads");
        let second = staging_table_name("roads");
        assert!(first.starts_with("roads_stg_"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_staging_name_never_shadows_an_importable_table() {
        // The suffix is a fresh random token, so dropping the staging
        // table cannot hit a previously imported table whose name merely
        // looks staging-like.
        let name = staging_table_name("parcels");
        assert_ne!(name, "parcels");
        assert_ne!(name, "parcels_wkt_staging");
        assert_ne!(name, staging_table_name("parcels"));
    }

    #[test]
    fn test_staging_name_fits_postgres_identifier_limit() {
        let long = "t".repeat(63);
        let name = staging_table_name(&long);
        assert!(name.len() <= 63);
        assert_ne!(name, long);
    }

    #[test]
    fn test_spatial_extension_error_detection() {
        assert!(is_spatial_extension_error(
            "ERROR: type \"geometry\" does not exist"
        ));
        assert!(is_spatial_extension_error(
            "function st_geomfromtext(text, integer) does not exist"
        ));
        assert!(!is_spatial_extension_error("relation \"roads\" exists"));
    }

    #[test]
    fn test_classify_db_error() {
        let err = anyhow::anyhow!("type \"geometry\" does not exist");
        assert!(matches!(
            classify_db_error(err),
            IngestError::SpatialExtensionMissing(_)
        ));

        let err = anyhow::anyhow!("deadlock detected");
        assert!(matches!(classify_db_error(err), IngestError::Import(_)));
    }
}

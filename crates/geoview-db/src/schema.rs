//! Schema introspection repository.
//!
//! Everything here reads `information_schema`; spatial columns are detected
//! by `udt_name` (the PostGIS `geometry`/`geography` types) or by the
//! well-known column names legacy loaders use.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{PgPool, Row};

use crate::quote::quote_ident;

/// PostGIS bookkeeping tables that should not appear in user-facing lists.
const SYSTEM_TABLE_PREFIXES: &[&str] =
    &["spatial_ref_sys", "geography_columns", "geometry_columns"];

/// Column names that conventionally hold geometry even when the type
/// metadata is missing.
const SPATIAL_COLUMN_NAMES: &[&str] = &["geometry", "geom", "the_geom", "wkb_geometry"];

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
}

impl ColumnInfo {
    pub fn is_spatial(&self) -> bool {
        self.udt_name == "geometry"
            || self.udt_name == "geography"
            || SPATIAL_COLUMN_NAMES.contains(&self.name.to_lowercase().as_str())
    }

    /// Whether keyword search can LIKE against this column.
    pub fn is_text(&self) -> bool {
        let t = self.data_type.to_lowercase();
        ["text", "varchar", "char", "string"]
            .iter()
            .any(|needle| t.contains(needle))
    }
}

/// Find the geometry column of a table, if it has one.
pub fn find_geometry_column(columns: &[ColumnInfo]) -> Option<&ColumnInfo> {
    columns.iter().find(|c| c.is_spatial())
}

/// One entry of the table overview listing.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: i64,
    pub columns: Vec<String>,
    pub has_spatial: bool,
}

/// Repository for `information_schema` lookups.
#[derive(Clone)]
pub struct SchemaRepository {
    pool: PgPool,
}

impl SchemaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All table names in the public schema, PostGIS system tables included.
    /// This is the snapshot the table namer probes against.
    pub async fn table_names_snapshot(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public'",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tables")?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// User-visible tables: base tables minus PostGIS bookkeeping.
    pub async fn list_user_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tables")?;

        Ok(rows
            .into_iter()
            .map(|r| r.get::<String, _>(0))
            .filter(|name| {
                !SYSTEM_TABLE_PREFIXES
                    .iter()
                    .any(|prefix| name.starts_with(prefix))
            })
            .collect())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check table existence")?;
        Ok(row.get::<bool, _>(0))
    }

    pub async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            "SELECT column_name, data_type, udt_name \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read columns of {}", table))?;

        Ok(rows
            .into_iter()
            .map(|r| ColumnInfo {
                name: r.get("column_name"),
                data_type: r.get("data_type"),
                udt_name: r.get("udt_name"),
            })
            .collect())
    }

    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(table)
        ))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to count rows of {}", table))?;
        Ok(row.get::<i64, _>(0))
    }

    /// Overview of every user table: row count, column names, spatial flag.
    /// Tables that error mid-introspection are skipped with a warning, so
    /// one broken table does not take down the whole listing.
    pub async fn table_overview(&self) -> Result<Vec<TableSummary>> {
        let mut summaries = Vec::new();
        for table in self.list_user_tables().await? {
            let columns = match self.columns(&table).await {
                Ok(cols) => cols,
                Err(err) => {
                    tracing::warn!(table = %table, error = %err, "Skipping table in overview");
                    continue;
                }
            };
            let row_count = match self.row_count(&table).await {
                Ok(count) => count,
                Err(err) => {
                    tracing::warn!(table = %table, error = %err, "Skipping table in overview");
                    continue;
                }
            };
            let has_spatial = find_geometry_column(&columns).is_some();
            summaries.push(TableSummary {
                name: table,
                row_count,
                columns: columns.into_iter().map(|c| c.name).collect(),
                has_spatial,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str, udt: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt_name: udt.to_string(),
        }
    }

    #[test]
    fn test_spatial_detection_by_udt() {
        assert!(col("shape", "USER-DEFINED", "geometry").is_spatial());
        assert!(col("shape", "USER-DEFINED", "geography").is_spatial());
        assert!(!col("name", "text", "text").is_spatial());
    }

    #[test]
    fn test_spatial_detection_by_well_known_name() {
        assert!(col("wkb_geometry", "bytea", "bytea").is_spatial());
        assert!(col("The_Geom", "bytea", "bytea").is_spatial());
    }

    #[test]
    fn test_text_detection() {
        assert!(col("name", "text", "text").is_text());
        assert!(col("label", "character varying", "varchar").is_text());
        assert!(!col("area", "double precision", "float8").is_text());
    }

    #[test]
    fn test_find_geometry_column_prefers_first() {
        let cols = vec![
            col("id", "integer", "int4"),
            col("geometry", "USER-DEFINED", "geometry"),
            col("geom", "USER-DEFINED", "geometry"),
        ];
        assert_eq!(find_geometry_column(&cols).unwrap().name, "geometry");
    }
}

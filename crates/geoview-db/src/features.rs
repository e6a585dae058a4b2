//! Feature data repository: attribute grids, GeoJSON assembly, bounds.
//!
//! GeoJSON is assembled inside Postgres with `jsonb_build_object` +
//! `ST_AsGeoJSON`, so geometry never round-trips through an intermediate
//! representation on the way to the client. Identifiers are quoted via
//! [`quote_ident`](crate::quote_ident) and must already be validated
//! against the catalog by the caller; filter values are bound.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};

use crate::quote::quote_ident;
use crate::schema::ColumnInfo;

/// Attribute grid of a table: column names plus row objects, with geometry
/// columns rendered as WKT text.
#[derive(Debug, Serialize)]
pub struct TableGrid {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

/// Bounding box of a table's geometry column, for the initial map viewport.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Clone)]
pub struct FeatureRepository {
    pool: PgPool,
}

impl FeatureRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// First `limit` rows of a table as JSON objects, geometry as WKT.
    pub async fn grid(&self, table: &str, columns: &[ColumnInfo], limit: i64) -> Result<TableGrid> {
        let pairs: Vec<String> = columns
            .iter()
            .map(|c| {
                let ident = quote_ident(&c.name);
                if c.is_spatial() {
                    format!("'{}', ST_AsText({})", c.name.replace('\'', "''"), ident)
                } else {
                    format!("'{}', {}", c.name.replace('\'', "''"), ident)
                }
            })
            .collect();

        let sql = format!(
            "SELECT jsonb_build_object({}) AS row FROM {} LIMIT $1",
            pairs.join(", "),
            quote_ident(table)
        );

        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read rows of {}", table))?;

        Ok(TableGrid {
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            rows: rows.into_iter().map(|r| r.get::<Value, _>("row")).collect(),
        })
    }

    /// A GeoJSON FeatureCollection for a spatial table, optionally filtered
    /// by a case-insensitive substring match across its text columns.
    ///
    /// With a filter but no text columns to search, the collection is empty
    /// rather than unfiltered — surfacing "nothing matched" instead of
    /// silently ignoring the query.
    pub async fn geojson(
        &self,
        table: &str,
        columns: &[ColumnInfo],
        geometry_col: &str,
        filter: Option<&str>,
        limit: i64,
    ) -> Result<Value> {
        let property_cols: Vec<&ColumnInfo> =
            columns.iter().filter(|c| !c.is_spatial()).collect();
        let text_cols: Vec<&ColumnInfo> = columns
            .iter()
            .filter(|c| c.is_text() && c.name != geometry_col)
            .collect();

        if let Some(query) = filter {
            if text_cols.is_empty() {
                return Ok(json!({
                    "type": "FeatureCollection",
                    "features": [],
                    "filter_applied": true,
                    "filter_query": query,
                    "total_features": 0,
                }));
            }
            let features = self
                .fetch_features(
                    table,
                    &property_cols,
                    geometry_col,
                    Some((text_cols.as_slice(), query)),
                    limit,
                )
                .await?;
            let total = features.len();
            return Ok(json!({
                "type": "FeatureCollection",
                "features": features,
                "filter_applied": true,
                "filter_query": query,
                "total_features": total,
            }));
        }

        let features = self
            .fetch_features(table, &property_cols, geometry_col, None, limit)
            .await?;
        Ok(json!({
            "type": "FeatureCollection",
            "features": features,
        }))
    }

    async fn fetch_features(
        &self,
        table: &str,
        property_cols: &[&ColumnInfo],
        geometry_col: &str,
        filter: Option<(&[&ColumnInfo], &str)>,
        limit: i64,
    ) -> Result<Vec<Value>> {
        let geom_ident = quote_ident(geometry_col);

        let properties_sql = if property_cols.is_empty() {
            "jsonb_build_object()".to_string()
        } else {
            let pairs: Vec<String> = property_cols
                .iter()
                .map(|c| {
                    format!(
                        "'{}', {}",
                        c.name.replace('\'', "''"),
                        quote_ident(&c.name)
                    )
                })
                .collect();
            format!("jsonb_build_object({})", pairs.join(", "))
        };

        let mut where_sql = format!("{} IS NOT NULL", geom_ident);
        if let Some((text_cols, _)) = filter {
            let conditions: Vec<String> = text_cols
                .iter()
                .map(|c| {
                    format!(
                        "LOWER(CAST({} AS TEXT)) LIKE LOWER($2)",
                        quote_ident(&c.name)
                    )
                })
                .collect();
            where_sql = format!("{} AND ({})", where_sql, conditions.join(" OR "));
        }

        let sql = format!(
            "SELECT jsonb_build_object(\
                'type', 'Feature', \
                'id', row_number() OVER (), \
                'geometry', ST_AsGeoJSON({})::jsonb, \
                'properties', {}\
             ) AS feature \
             FROM {} WHERE {} LIMIT $1",
            geom_ident,
            properties_sql,
            quote_ident(table),
            where_sql
        );

        let mut query = sqlx::query(&sql).bind(limit);
        if let Some((_, pattern)) = filter {
            query = query.bind(format!("%{}%", pattern));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to build GeoJSON for {}", table))?;

        Ok(rows
            .into_iter()
            .map(|r| r.get::<Value, _>("feature"))
            .collect())
    }

    /// Extent of a table's geometry column; `None` when every geometry is
    /// NULL (or the table is empty).
    pub async fn bounds(&self, table: &str, geometry_col: &str) -> Result<Option<Bounds>> {
        let geom_ident = quote_ident(geometry_col);
        let sql = format!(
            "SELECT ST_XMin(extent), ST_YMin(extent), ST_XMax(extent), ST_YMax(extent) \
             FROM (SELECT ST_Extent({}) AS extent FROM {} WHERE {} IS NOT NULL) AS sub",
            geom_ident,
            quote_ident(table),
            geom_ident
        );

        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to compute bounds of {}", table))?;

        let min_x: Option<f64> = row.get(0);
        let min_y: Option<f64> = row.get(1);
        let max_x: Option<f64> = row.get(2);
        let max_y: Option<f64> = row.get(3);

        Ok(match (min_x, min_y, max_x, max_y) {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => Some(Bounds {
                min_x,
                min_y,
                max_x,
                max_y,
            }),
            _ => None,
        })
    }

    /// All rows of a spatial table for export: WKT geometry plus attribute
    /// values as a JSON object keyed by column name.
    pub async fn export_rows(
        &self,
        table: &str,
        columns: &[ColumnInfo],
        geometry_col: &str,
    ) -> Result<Vec<(Option<String>, Value)>> {
        let property_cols: Vec<&ColumnInfo> =
            columns.iter().filter(|c| !c.is_spatial()).collect();

        let properties_sql = if property_cols.is_empty() {
            "jsonb_build_object()".to_string()
        } else {
            let pairs: Vec<String> = property_cols
                .iter()
                .map(|c| {
                    format!(
                        "'{}', {}",
                        c.name.replace('\'', "''"),
                        quote_ident(&c.name)
                    )
                })
                .collect();
            format!("jsonb_build_object({})", pairs.join(", "))
        };

        let sql = format!(
            "SELECT ST_AsText({}) AS wkt, {} AS props FROM {}",
            quote_ident(geometry_col),
            properties_sql,
            quote_ident(table)
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to export rows of {}", table))?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<Option<String>, _>("wkt"), r.get::<Value, _>("props")))
            .collect())
    }
}

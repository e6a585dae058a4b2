//! Keyword search across table names, column names, and row values.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

use crate::quote::quote_ident;
use crate::schema::{find_geometry_column, ColumnInfo, SchemaRepository};

/// Cap on returned tables.
const MAX_RESULTS: usize = 20;
/// Cap on sample matching rows per table.
const MAX_SAMPLES: i64 = 3;
/// Data matches stop contributing to the relevance score past this count.
const DATA_MATCH_SCORE_CAP: i64 = 10;

/// A sample row that matched, reduced to the fields containing the query.
#[derive(Debug, Serialize)]
pub struct DataMatch {
    pub matching_fields: Map<String, Value>,
}

/// One table's search outcome.
#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub table_name: String,
    pub table_match: bool,
    pub column_matches: Vec<String>,
    pub data_matches: Vec<DataMatch>,
    pub total_data_matches: i64,
    pub has_spatial: bool,
    pub total_columns: usize,
    pub relevance_score: i64,
}

#[derive(Clone)]
pub struct SearchRepository {
    pool: PgPool,
    schema: SchemaRepository,
}

impl SearchRepository {
    pub fn new(pool: PgPool) -> Self {
        let schema = SchemaRepository::new(pool.clone());
        Self { pool, schema }
    }

    /// Search every user table for `query` in its name, column names, and
    /// text-column values. Results are scored (name match 10, column match
    /// 5 each, data matches 2 each capped at 10), sorted by score, and
    /// capped at 20 tables. Tables that error are skipped with a warning so
    /// a single unreadable table cannot break search.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let needle = query.to_lowercase();
        let mut results = Vec::new();

        for table in self.schema.list_user_tables().await? {
            match self.search_table(&table, query, &needle).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(table = %table, error = %err, "Skipping table in search");
                }
            }
        }

        results.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
        results.truncate(MAX_RESULTS);
        Ok(results)
    }

    async fn search_table(
        &self,
        table: &str,
        query: &str,
        needle: &str,
    ) -> Result<Option<SearchResult>> {
        let columns = self.schema.columns(table).await?;

        let table_match = table.to_lowercase().contains(needle);
        let column_matches: Vec<String> = columns
            .iter()
            .filter(|c| c.name.to_lowercase().contains(needle))
            .map(|c| c.name.clone())
            .collect();

        let text_cols: Vec<&ColumnInfo> = columns.iter().filter(|c| c.is_text()).collect();

        let (total_data_matches, data_matches) = if text_cols.is_empty() {
            (0, Vec::new())
        } else {
            self.match_rows(table, &text_cols, query, needle).await?
        };

        if !table_match && column_matches.is_empty() && data_matches.is_empty() {
            return Ok(None);
        }

        let relevance_score = (if table_match { 10 } else { 0 })
            + column_matches.len() as i64 * 5
            + total_data_matches.min(DATA_MATCH_SCORE_CAP) * 2;

        Ok(Some(SearchResult {
            table_name: table.to_string(),
            table_match,
            column_matches,
            data_matches,
            total_data_matches,
            has_spatial: find_geometry_column(&columns).is_some(),
            total_columns: columns.len(),
            relevance_score,
        }))
    }

    /// Count rows whose text columns contain the query, and fetch a few
    /// sample rows reduced to the fields that actually matched.
    async fn match_rows(
        &self,
        table: &str,
        text_cols: &[&ColumnInfo],
        query: &str,
        needle: &str,
    ) -> Result<(i64, Vec<DataMatch>)> {
        let conditions: Vec<String> = text_cols
            .iter()
            .map(|c| {
                format!(
                    "LOWER(CAST({} AS TEXT)) LIKE LOWER($1)",
                    quote_ident(&c.name)
                )
            })
            .collect();
        let where_sql = conditions.join(" OR ");
        let pattern = format!("%{}%", query);

        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(table),
            where_sql
        );
        let count: i64 = sqlx::query(&count_sql)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count matches in {}", table))?
            .get(0);

        if count == 0 {
            return Ok((0, Vec::new()));
        }

        let pairs: Vec<String> = text_cols
            .iter()
            .map(|c| {
                format!(
                    "'{}', {}",
                    c.name.replace('\'', "''"),
                    quote_ident(&c.name)
                )
            })
            .collect();
        let sample_sql = format!(
            "SELECT jsonb_build_object({}) AS row FROM {} WHERE {} LIMIT $2",
            pairs.join(", "),
            quote_ident(table),
            where_sql
        );

        let rows = sqlx::query(&sample_sql)
            .bind(&pattern)
            .bind(MAX_SAMPLES)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to sample matches in {}", table))?;

        let samples = rows
            .into_iter()
            .filter_map(|r| {
                let row: Value = r.get("row");
                let fields = matching_fields(&row, needle);
                if fields.is_empty() {
                    None
                } else {
                    Some(DataMatch {
                        matching_fields: fields,
                    })
                }
            })
            .collect();

        Ok((count, samples))
    }
}

/// Reduce a sampled row object to the fields whose value contains the
/// query (case-insensitive).
fn matching_fields(row: &Value, needle: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Value::Object(obj) = row {
        for (key, value) in obj {
            if let Value::String(text) = value {
                if text.to_lowercase().contains(needle) {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matching_fields_filters_by_value() {
        let row = json!({"name": "River Park", "kind": "forest", "code": "RP1"});
        let fields = matching_fields(&row, "park");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("name").unwrap(), "River Park");
    }

    #[test]
    fn test_matching_fields_ignores_non_strings() {
        let row = json!({"name": "trail", "length": 42});
        let fields = matching_fields(&row, "42");
        assert!(fields.is_empty());
    }
}

//! The in-memory feature model.
//!
//! A `FeatureSet` is what the ingestion pipeline works on between parsing a
//! shapefile and writing a spatial table: a fixed attribute schema, one row
//! per feature, and one optional geometry per row. Every row carries its
//! values in column order; the geometry column is nullable per row but the
//! schema-level geometry slot always exists.

use chrono::NaiveDate;
use geo_types::Geometry;

use super::Crs;

/// Attribute column type, fixed at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Text,
    Number,
    Bool,
    Date,
}

impl AttrKind {
    /// Postgres column type this attribute kind maps to.
    pub fn sql_type(&self) -> &'static str {
        match self {
            AttrKind::Text => "text",
            AttrKind::Number => "double precision",
            AttrKind::Bool => "boolean",
            AttrKind::Date => "date",
        }
    }
}

/// A single attribute value, tagged by kind. `Null` stands for a missing
/// value of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

/// One attribute column: case-preserving name plus its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: AttrKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One feature: an optional geometry plus attribute values in column order.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub geometry: Option<Geometry<f64>>,
    pub values: Vec<AttrValue>,
}

/// An in-memory table of features parsed from a shapefile payload.
///
/// Invariant: every row's `values` has exactly `columns.len()` entries.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<FeatureRow>,
    /// CRS declared by the source, if any. The normalizer fills this in
    /// (or rewrites it) before the writer runs.
    pub crs: Option<Crs>,
}

impl FeatureSet {
    pub fn new(columns: Vec<ColumnSpec>, crs: Option<Crs>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            crs,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Push a row, enforcing the schema-width invariant.
    pub fn push_row(&mut self, row: FeatureRow) {
        debug_assert_eq!(row.values.len(), self.columns.len());
        self.rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;

    #[test]
    fn test_push_row_and_len() {
        let mut fs = FeatureSet::new(
            vec![
                ColumnSpec::new("name", AttrKind::Text),
                ColumnSpec::new("area", AttrKind::Number),
            ],
            Some(Crs::wgs84()),
        );
        assert!(fs.is_empty());

        fs.push_row(FeatureRow {
            geometry: Some(point!(x: 1.0, y: 2.0).into()),
            values: vec![AttrValue::Text("park".to_string()), AttrValue::Number(3.5)],
        });
        fs.push_row(FeatureRow {
            geometry: None,
            values: vec![AttrValue::Null, AttrValue::Null],
        });

        assert_eq!(fs.len(), 2);
        assert!(fs.rows[1].geometry.is_none());
    }

    #[test]
    fn test_attr_kind_sql_types() {
        assert_eq!(AttrKind::Text.sql_type(), "text");
        assert_eq!(AttrKind::Number.sql_type(), "double precision");
        assert_eq!(AttrKind::Bool.sql_type(), "boolean");
        assert_eq!(AttrKind::Date.sql_type(), "date");
    }
}

//! Assemble a zipped shapefile from exported table rows.
//!
//! A shapefile holds exactly one shape class, so the first non-NULL
//! geometry picks the class and rows of other classes are skipped with
//! a warning. Attribute columns become DBF fields: numeric and boolean
//! columns keep their type, everything else (dates included) exports as
//! text, and names are truncated to the DBF's ten-character limit.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use geo_types::Geometry;
use geoview_db::ColumnInfo;
use serde_json::Value;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::record::EsriShape;
use wkt::TryFromWkt;

/// ESRI WKT definition written as the `.prj` sidecar. Exports are always
/// in the storage CRS, which imports normalize to WGS84.
const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

const DBF_NAME_LIMIT: usize = 10;
const DBF_TEXT_WIDTH: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeClass {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Number,
    Bool,
}

/// Build the zip archive bytes for one table.
pub fn build_shapefile_zip(
    table: &str,
    columns: &[ColumnInfo],
    rows: &[(Option<String>, Value)],
) -> Result<Vec<u8>> {
    let geometries: Vec<Option<Geometry<f64>>> = rows
        .iter()
        .map(|(wkt, _)| wkt.as_deref().and_then(parse_wkt))
        .collect();
    let class = geometries
        .iter()
        .flatten()
        .next()
        .and_then(classify)
        .ok_or_else(|| anyhow!("Table has no exportable geometry"))?;

    let property_cols: Vec<&ColumnInfo> =
        columns.iter().filter(|col| !col.is_spatial()).collect();
    let fields: Vec<(String, String, FieldKind)> = property_cols
        .iter()
        .map(|col| {
            (
                col.name.clone(),
                dbf_field_name(&col.name),
                field_kind(col),
            )
        })
        .collect();

    let mut builder = TableWriterBuilder::new();
    for (_, dbf_name, kind) in &fields {
        let name = FieldName::try_from(dbf_name.as_str())
            .map_err(|err| anyhow!("Invalid DBF field name '{}': {:?}", dbf_name, err))?;
        builder = match kind {
            FieldKind::Number => builder.add_numeric_field(name, 24, 15),
            FieldKind::Bool => builder.add_logical_field(name),
            FieldKind::Text => builder.add_character_field(name, DBF_TEXT_WIDTH),
        };
    }

    let records: Vec<Record> = rows
        .iter()
        .map(|(_, props)| build_record(&fields, props))
        .collect();

    let scratch = tempfile::tempdir().context("Failed to create export scratch dir")?;
    let shp_path = scratch.path().join(format!("{}.shp", table));
    write_shapes(&shp_path, builder, class, &geometries, &records)?;
    std::fs::write(scratch.path().join(format!("{}.prj", table)), WGS84_PRJ)?;

    zip_sidecars(scratch.path(), table)
}

fn parse_wkt(wkt: &str) -> Option<Geometry<f64>> {
    match Geometry::try_from_wkt_str(wkt) {
        Ok(geometry) => Some(geometry),
        Err(err) => {
            tracing::warn!(error = %err, "Skipping unparseable geometry in export");
            None
        }
    }
}

fn classify(geometry: &Geometry<f64>) -> Option<ShapeClass> {
    match geometry {
        Geometry::Point(_) => Some(ShapeClass::Point),
        Geometry::MultiPoint(_) => Some(ShapeClass::Multipoint),
        Geometry::LineString(_) | Geometry::MultiLineString(_) => Some(ShapeClass::Polyline),
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Some(ShapeClass::Polygon),
        _ => None,
    }
}

fn write_shapes(
    shp_path: &Path,
    builder: TableWriterBuilder,
    class: ShapeClass,
    geometries: &[Option<Geometry<f64>>],
    records: &[Record],
) -> Result<()> {
    match class {
        ShapeClass::Point => write_class(shp_path, builder, geometries, records, |g| match g {
            Geometry::Point(point) => Some(shapefile::Point::new(point.x(), point.y())),
            _ => None,
        }),
        ShapeClass::Multipoint => write_class(shp_path, builder, geometries, records, |g| {
            match g {
                Geometry::MultiPoint(points) => Some(shapefile::Multipoint::from(points.clone())),
                _ => None,
            }
        }),
        ShapeClass::Polyline => write_class(shp_path, builder, geometries, records, |g| match g {
            Geometry::LineString(line) => Some(shapefile::Polyline::from(line.clone())),
            Geometry::MultiLineString(lines) => Some(shapefile::Polyline::from(lines.clone())),
            _ => None,
        }),
        ShapeClass::Polygon => write_class(shp_path, builder, geometries, records, |g| match g {
            Geometry::Polygon(polygon) => Some(shapefile::Polygon::from(polygon.clone())),
            Geometry::MultiPolygon(polygons) => Some(shapefile::Polygon::from(polygons.clone())),
            _ => None,
        }),
    }
}

fn write_class<S, F>(
    shp_path: &Path,
    builder: TableWriterBuilder,
    geometries: &[Option<Geometry<f64>>],
    records: &[Record],
    convert: F,
) -> Result<()>
where
    S: EsriShape,
    F: Fn(&Geometry<f64>) -> Option<S>,
{
    let mut writer = shapefile::Writer::from_path(shp_path, builder)
        .context("Failed to create shapefile writer")?;

    for (index, (geometry, record)) in geometries.iter().zip(records).enumerate() {
        let Some(geometry) = geometry else {
            tracing::warn!(row = index, "Skipping row without geometry in export");
            continue;
        };
        let Some(shape) = convert(geometry) else {
            tracing::warn!(row = index, "Skipping row with mismatched shape class");
            continue;
        };
        writer
            .write_shape_and_record(&shape, record)
            .context("Failed to write shapefile record")?;
    }
    Ok(())
}

fn field_kind(col: &ColumnInfo) -> FieldKind {
    let data_type = col.data_type.to_lowercase();
    if ["double", "numeric", "real", "integer", "bigint", "smallint"]
        .iter()
        .any(|needle| data_type.contains(needle))
    {
        FieldKind::Number
    } else if data_type.contains("boolean") {
        FieldKind::Bool
    } else {
        FieldKind::Text
    }
}

/// DBF field names are at most ten ASCII characters.
fn dbf_field_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(DBF_NAME_LIMIT)
        .collect()
}

fn build_record(fields: &[(String, String, FieldKind)], props: &Value) -> Record {
    let mut record = Record::default();
    for (column_name, dbf_name, kind) in fields {
        let value = props.get(column_name);
        let field_value = match kind {
            FieldKind::Number => FieldValue::Numeric(value.and_then(Value::as_f64)),
            FieldKind::Bool => FieldValue::Logical(value.and_then(Value::as_bool)),
            FieldKind::Text => FieldValue::Character(value.and_then(json_to_text)),
        };
        record.insert(dbf_name.clone(), field_value);
    }
    record
}

fn json_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn zip_sidecars(dir: &Path, table: &str) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(&mut buffer);
    let options = zip::write::FileOptions::default();

    for extension in ["shp", "shx", "dbf", "prj"] {
        let path: PathBuf = dir.join(format!("{}.{}", table, extension));
        if !path.exists() {
            continue;
        }
        zip.start_file(format!("{}.{}", table, extension), options)
            .context("Failed to start zip entry")?;
        zip.write_all(&std::fs::read(&path)?)
            .context("Failed to write zip entry")?;
    }
    zip.finish().context("Failed to finish zip archive")?;
    drop(zip);
    Ok(buffer.into_inner())
}

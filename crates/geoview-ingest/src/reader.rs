//! Shapefile parsing into the in-memory feature model.
//!
//! The `.shp` geometry stream and the `.dbf` attribute table are read
//! separately so the attribute schema keeps its on-disk column order. A
//! missing `.dbf` yields a geometry-only feature set rather than an
//! error; a missing `.prj` leaves the CRS undeclared for the normalizer
//! to handle.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo_types::Geometry;
use geoview_core::models::{AttrKind, AttrValue, ColumnSpec, Crs, FeatureRow, FeatureSet};
use shapefile::dbase::{self, FieldType, FieldValue};
use shapefile::{Shape, ShapeReader};

use crate::error::IngestError;

/// Parse `shp_path` and its sidecars into a [`FeatureSet`].
pub fn read_feature_set(shp_path: &Path) -> Result<FeatureSet, IngestError> {
    let shapes = ShapeReader::from_path(shp_path)
        .map_err(|err| IngestError::Processing(format!("Failed to open shapefile: {}", err)))?
        .read()
        .map_err(|err| IngestError::Processing(format!("Failed to read shapes: {}", err)))?;

    let (columns, records) = read_attributes(shp_path)?;
    let crs = read_crs(shp_path)?;

    let mut feature_set = FeatureSet::new(columns, crs);
    for (index, shape) in shapes.into_iter().enumerate() {
        let geometry = convert_shape(shape, index);
        let values = match records.get(index) {
            Some(record) => feature_set
                .columns
                .iter()
                .map(|col| record.get(&col.name).map(field_to_attr).unwrap_or(AttrValue::Null))
                .collect(),
            // Geometry without a matching attribute record; pad with NULLs.
            None => vec![AttrValue::Null; feature_set.columns.len()],
        };
        feature_set.push_row(FeatureRow { geometry, values });
    }

    if feature_set.is_empty() {
        return Err(IngestError::NoFeatures);
    }

    tracing::debug!(
        features = feature_set.len(),
        columns = feature_set.columns.len(),
        crs = ?feature_set.crs.as_ref().and_then(Crs::display_name),
        "Parsed shapefile"
    );
    Ok(feature_set)
}

/// Read the `.dbf` sidecar: ordered column schema plus all records.
fn read_attributes(
    shp_path: &Path,
) -> Result<(Vec<ColumnSpec>, Vec<dbase::Record>), IngestError> {
    let Some(dbf_path) = sidecar_path(shp_path, "dbf") else {
        tracing::warn!(
            shapefile = %shp_path.display(),
            "No .dbf sidecar; importing geometry only"
        );
        return Ok((Vec::new(), Vec::new()));
    };

    let mut reader = dbase::Reader::from_path(&dbf_path)
        .map_err(|err| IngestError::Processing(format!("Failed to open attributes: {}", err)))?;

    let columns: Vec<ColumnSpec> = reader
        .fields()
        .iter()
        .filter(|field| field.field_type() != FieldType::Memo)
        .map(|field| ColumnSpec::new(field.name(), attr_kind(field.field_type())))
        .collect();

    let records: Vec<dbase::Record> = reader
        .iter_records()
        .collect::<Result<_, _>>()
        .map_err(|err| IngestError::Processing(format!("Failed to read attributes: {}", err)))?;

    Ok((columns, records))
}

fn read_crs(shp_path: &Path) -> Result<Option<Crs>, IngestError> {
    match sidecar_path(shp_path, "prj") {
        Some(prj_path) => {
            let wkt = std::fs::read_to_string(prj_path)?;
            Ok(Some(Crs::from_prj_wkt(&wkt)))
        }
        None => Ok(None),
    }
}

/// Find a sidecar of `shp_path` with the given extension, tolerating the
/// upper/lowercase variants archive tools produce.
fn sidecar_path(shp_path: &Path, extension: &str) -> Option<PathBuf> {
    for candidate_ext in [extension.to_lowercase(), extension.to_uppercase()] {
        let candidate = shp_path.with_extension(candidate_ext);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn attr_kind(field_type: FieldType) -> AttrKind {
    match field_type {
        FieldType::Numeric
        | FieldType::Float
        | FieldType::Integer
        | FieldType::Currency
        | FieldType::Double => AttrKind::Number,
        FieldType::Logical => AttrKind::Bool,
        FieldType::Date => AttrKind::Date,
        _ => AttrKind::Text,
    }
}

fn field_to_attr(value: &FieldValue) -> AttrValue {
    match value {
        FieldValue::Character(Some(text)) => AttrValue::Text(text.clone()),
        FieldValue::Character(None) => AttrValue::Null,
        FieldValue::Numeric(Some(number)) => AttrValue::Number(*number),
        FieldValue::Numeric(None) => AttrValue::Null,
        FieldValue::Float(Some(number)) => AttrValue::Number(f64::from(*number)),
        FieldValue::Float(None) => AttrValue::Null,
        FieldValue::Integer(number) => AttrValue::Number(f64::from(*number)),
        FieldValue::Double(number) => AttrValue::Number(*number),
        FieldValue::Currency(number) => AttrValue::Number(*number),
        FieldValue::Logical(Some(flag)) => AttrValue::Bool(*flag),
        FieldValue::Logical(None) => AttrValue::Null,
        FieldValue::Date(Some(date)) => {
            match NaiveDate::from_ymd_opt(date.year() as i32, date.month(), date.day()) {
                Some(parsed) => AttrValue::Date(parsed),
                None => AttrValue::Null,
            }
        }
        FieldValue::Date(None) => AttrValue::Null,
        other => AttrValue::Text(format!("{:?}", other)),
    }
}

/// Convert a raw shape into geometry, treating null shapes and shapes we
/// cannot represent as missing geometry rather than fatal errors.
fn convert_shape(shape: Shape, index: usize) -> Option<Geometry<f64>> {
    if matches!(shape, Shape::NullShape) {
        return None;
    }
    match Geometry::<f64>::try_from(shape) {
        Ok(geometry) => Some(geometry),
        Err(err) => {
            tracing::warn!(feature = index, error = %err, "Skipping unconvertible geometry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use geo_types::point;
    use shapefile::dbase::TableWriterBuilder;
    use shapefile::Point;

    use super::*;

    const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    /// Write a two-point shapefile with name/size attributes into `dir`.
    fn write_fixture(dir: &Path) -> PathBuf {
        let shp_path = dir.join("parks.shp");
        let table = TableWriterBuilder::new()
            .add_character_field("name".try_into().unwrap(), 50)
            .add_numeric_field("size_ha".try_into().unwrap(), 12, 3);
        let mut writer = shapefile::Writer::from_path(&shp_path, table).unwrap();

        let mut record = dbase::Record::default();
        record.insert(
            "name".to_string(),
            FieldValue::Character(Some("River Park".to_string())),
        );
        record.insert("size_ha".to_string(), FieldValue::Numeric(Some(12.5)));
        writer
            .write_shape_and_record(&Point::new(10.0, 20.0), &record)
            .unwrap();

        let mut record = dbase::Record::default();
        record.insert("name".to_string(), FieldValue::Character(None));
        record.insert("size_ha".to_string(), FieldValue::Numeric(None));
        writer
            .write_shape_and_record(&Point::new(-5.0, 7.5), &record)
            .unwrap();
        drop(writer);

        std::fs::write(dir.join("parks.prj"), WGS84_PRJ).unwrap();
        shp_path
    }

    #[test]
    fn test_reads_features_attributes_and_crs() {
        let dir = tempfile::tempdir().unwrap();
        let shp_path = write_fixture(dir.path());

        let fs = read_feature_set(&shp_path).unwrap();
        assert_eq!(fs.len(), 2);
        assert_eq!(fs.columns.len(), 2);
        assert_eq!(fs.columns[0].name, "name");
        assert_eq!(fs.columns[0].kind, AttrKind::Text);
        assert_eq!(fs.columns[1].kind, AttrKind::Number);

        assert_eq!(
            fs.rows[0].geometry,
            Some(point!(x: 10.0, y: 20.0).into())
        );
        assert_eq!(
            fs.rows[0].values[0],
            AttrValue::Text("River Park".to_string())
        );
        assert_eq!(fs.rows[0].values[1], AttrValue::Number(12.5));
        assert_eq!(fs.rows[1].values[0], AttrValue::Null);

        assert!(fs.crs.as_ref().unwrap().is_wgs84());
    }

    #[test]
    fn test_missing_prj_leaves_crs_undeclared() {
        let dir = tempfile::tempdir().unwrap();
        let shp_path = write_fixture(dir.path());
        std::fs::remove_file(dir.path().join("parks.prj")).unwrap();

        let fs = read_feature_set(&shp_path).unwrap();
        assert!(fs.crs.is_none());
    }

    /// A well-formed `.shp` holding only the 100-byte header (file
    /// length 50 sixteen-bit words, shape type point), i.e. zero records.
    fn write_empty_fixture(dir: &Path) -> PathBuf {
        let mut header = Vec::with_capacity(100);
        header.extend_from_slice(&9994i32.to_be_bytes());
        header.extend_from_slice(&[0u8; 20]);
        header.extend_from_slice(&50i32.to_be_bytes());
        header.extend_from_slice(&1000i32.to_le_bytes());
        header.extend_from_slice(&1i32.to_le_bytes());
        header.extend_from_slice(&[0u8; 64]);

        let shp_path = dir.join("empty.shp");
        std::fs::write(&shp_path, &header).unwrap();
        std::fs::write(shp_path.with_extension("shx"), &header).unwrap();
        shp_path
    }

    #[test]
    fn test_shapefile_with_no_shapes_is_no_features() {
        let dir = tempfile::tempdir().unwrap();
        let shp_path = write_empty_fixture(dir.path());

        assert!(matches!(
            read_feature_set(&shp_path),
            Err(IngestError::NoFeatures)
        ));
    }

    #[test]
    fn test_unreadable_shapefile_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let shp_path = dir.path().join("broken.shp");
        std::fs::write(&shp_path, b"garbage").unwrap();

        assert!(matches!(
            read_feature_set(&shp_path),
            Err(IngestError::Processing(_))
        ));
    }
}

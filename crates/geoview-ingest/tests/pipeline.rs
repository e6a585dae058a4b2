//! Pipeline tests.
//!
//! The archive-to-feature-set path runs everywhere. Tests that need a
//! PostGIS database are `#[ignore]`d and keyed on `DATABASE_URL`; run
//! them with `cargo test -- --ignored` against a scratch database.

use std::io::Write;
use std::path::Path;

use geoview_core::models::{AttrKind, AttrValue};
use geoview_ingest::locate::locate;
use geoview_ingest::reader::read_feature_set;
use geoview_ingest::stage::stage;
use shapefile::dbase::{FieldValue, Record, TableWriterBuilder};
use shapefile::Point;

const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// Build a complete point shapefile on disk and zip it up.
fn build_shapefile_zip(dir: &Path, with_prj: bool) -> Vec<u8> {
    let shp_path = dir.join("parks.shp");
    let table = TableWriterBuilder::new()
        .add_character_field("name".try_into().unwrap(), 50)
        .add_numeric_field("size_ha".try_into().unwrap(), 12, 3);
    let mut writer = shapefile::Writer::from_path(&shp_path, table).unwrap();

    for (index, (x, y, name)) in [
        (13.4, 52.5, "River Park"),
        (13.5, 52.6, "Hill Park"),
        (13.6, 52.4, "Old Orchard"),
    ]
    .iter()
    .enumerate()
    {
        let mut record = Record::default();
        record.insert(
            "name".to_string(),
            FieldValue::Character(Some(name.to_string())),
        );
        record.insert(
            "size_ha".to_string(),
            FieldValue::Numeric(Some(1.5 * (index + 1) as f64)),
        );
        writer
            .write_shape_and_record(&Point::new(*x, *y), &record)
            .unwrap();
    }
    drop(writer);

    if with_prj {
        std::fs::write(dir.join("parks.prj"), WGS84_PRJ).unwrap();
    }

    let mut buffer = std::io::Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(&mut buffer);
    let options = zip::write::FileOptions::default();
    for name in ["parks.shp", "parks.shx", "parks.dbf", "parks.prj"] {
        let path = dir.join(name);
        if path.exists() {
            zip.start_file(name, options).unwrap();
            zip.write_all(&std::fs::read(&path).unwrap()).unwrap();
        }
    }
    zip.finish().unwrap();
    drop(zip);
    buffer.into_inner()
}

#[test]
fn archive_to_feature_set() {
    let fixture_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let payload = build_shapefile_zip(fixture_dir.path(), true);

    let staged = stage(&payload, "City Parks.zip", scratch.path()).unwrap();
    let located = locate(&staged).unwrap();
    let feature_set = read_feature_set(&located.shp_path).unwrap();

    assert_eq!(feature_set.len(), 3);
    assert_eq!(feature_set.columns.len(), 2);
    assert_eq!(feature_set.columns[0].name, "name");
    assert_eq!(feature_set.columns[0].kind, AttrKind::Text);
    assert_eq!(feature_set.columns[1].name, "size_ha");
    assert_eq!(feature_set.columns[1].kind, AttrKind::Number);
    assert_eq!(
        feature_set.rows[0].values[0],
        AttrValue::Text("River Park".to_string())
    );
    assert!(feature_set.crs.as_ref().unwrap().is_wgs84());
    assert!(feature_set.rows.iter().all(|row| row.geometry.is_some()));
}

#[test]
fn scratch_files_removed_after_staging_drops() {
    let fixture_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let payload = build_shapefile_zip(fixture_dir.path(), false);

    {
        let staged = stage(&payload, "parks.zip", scratch.path()).unwrap();
        locate(&staged).unwrap();
        assert_ne!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

mod live_db {
    use super::*;

    use geoview_core::AppConfig;
    use geoview_ingest::ShapefileIngestor;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::{PgPool, Row};

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at PostGIS");
        PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("connect")
    }

    fn test_config(scratch: &Path) -> AppConfig {
        AppConfig {
            server_port: 0,
            database_url: "postgresql://unused/unused".to_string(),
            cors_origins: vec!["*".to_string()],
            db_max_connections: 2,
            db_timeout_seconds: 5,
            environment: "test".to_string(),
            max_upload_size_bytes: 10 * 1024 * 1024,
            scratch_dir: scratch.to_path_buf(),
            default_srid: 4326,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn ingest_creates_spatial_table() {
        let fixture_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let payload = build_shapefile_zip(fixture_dir.path(), true);

        let pool = test_pool().await;
        sqlx::query("DROP TABLE IF EXISTS ingest_parks")
            .execute(&pool)
            .await
            .unwrap();

        let ingestor = ShapefileIngestor::new(pool.clone(), &test_config(scratch.path()));
        let report = ingestor
            .ingest(payload.into(), "parks.zip", Some("ingest_parks"))
            .await
            .unwrap();

        assert_eq!(report.table_name, "ingest_parks");
        assert_eq!(report.feature_count, 3);
        assert_eq!(report.crs.as_deref(), Some("EPSG:4326"));

        let row = sqlx::query(
            "SELECT COUNT(*) AS n, COUNT(geometry) AS geoms FROM ingest_parks",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 3);
        assert_eq!(row.get::<i64, _>("geoms"), 3);

        let srid: i32 = sqlx::query("SELECT ST_SRID(geometry) FROM ingest_parks LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        assert_eq!(srid, 4326);

        sqlx::query("DROP TABLE IF EXISTS ingest_parks")
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn reupload_gets_suffixed_name() {
        let fixture_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let payload = build_shapefile_zip(fixture_dir.path(), true);

        let pool = test_pool().await;
        for table in ["reupload_case", "reupload_case_1"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&pool)
                .await
                .unwrap();
        }

        let ingestor = ShapefileIngestor::new(pool.clone(), &test_config(scratch.path()));
        let first = ingestor
            .ingest(payload.clone().into(), "Reupload Case.zip", None)
            .await
            .unwrap();
        let second = ingestor
            .ingest(payload.into(), "Reupload Case.zip", None)
            .await
            .unwrap();

        assert_eq!(first.table_name, "reupload_case");
        assert_eq!(second.table_name, "reupload_case_1");

        for table in ["reupload_case", "reupload_case_1"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&pool)
                .await
                .unwrap();
        }
    }
}

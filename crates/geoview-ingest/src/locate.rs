//! Archive extraction and shapefile location.
//!
//! Extraction refuses entries whose paths would escape the scratch
//! directory (absolute paths, `..` components); such entries are skipped
//! with a warning rather than failing the whole upload. The `.shp` scan
//! is recursive because archives routinely nest their payload in a
//! subdirectory.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::IngestError;
use crate::stage::StagedArchive;

/// The single shapefile found inside an extracted archive.
pub struct ShapefilePayload {
    pub shp_path: PathBuf,
}

/// Extract the staged archive and find exactly one `.shp` inside it.
pub fn locate(archive: &StagedArchive) -> Result<ShapefilePayload, IngestError> {
    let extract_root = archive.scratch_dir().join("extracted");
    fs::create_dir_all(&extract_root)?;
    extract_archive(archive.zip_path(), &extract_root)?;

    let mut shapefiles = Vec::new();
    collect_shapefiles(&extract_root, &mut shapefiles)?;
    shapefiles.sort();

    match shapefiles.len() {
        0 => Err(IngestError::NoShapefile),
        1 => {
            let shp_path = shapefiles.pop().ok_or(IngestError::NoShapefile)?;
            tracing::debug!(path = %shp_path.display(), "Located shapefile in archive");
            Ok(ShapefilePayload { shp_path })
        }
        n => {
            tracing::debug!(count = n, "Archive contains multiple shapefiles");
            Err(IngestError::MultipleShapefiles)
        }
    }
}

fn extract_archive(zip_path: &Path, dest_root: &Path) -> Result<(), IngestError> {
    let file = File::open(zip_path)?;
    let mut zip =
        ZipArchive::new(file).map_err(|err| IngestError::CorruptArchive(err.to_string()))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|err| IngestError::CorruptArchive(err.to_string()))?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!(entry = %entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };

        let dest = dest_root.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            std::io::copy(&mut entry, &mut out)?;
        }
    }
    Ok(())
}

fn collect_shapefiles(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), IngestError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_shapefiles(&path, found)?;
        } else if path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("shp"))
            .unwrap_or(false)
        {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::stage::stage;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::FileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        drop(writer);
        buffer.into_inner()
    }

    fn staged(entries: &[(&str, &[u8])], root: &Path) -> StagedArchive {
        stage(&build_zip(entries), "upload.zip", root).unwrap()
    }

    #[test]
    fn test_locate_finds_single_shapefile() {
        let root = tempfile::tempdir().unwrap();
        let archive = staged(
            &[
                ("parks.shp", b"shp".as_slice()),
                ("parks.dbf", b"dbf".as_slice()),
                ("parks.prj", b"prj".as_slice()),
            ],
            root.path(),
        );
        let payload = locate(&archive).unwrap();
        assert_eq!(payload.shp_path.file_name().unwrap(), "parks.shp");
    }

    #[test]
    fn test_locate_finds_nested_shapefile() {
        let root = tempfile::tempdir().unwrap();
        let archive = staged(&[("data/roads/roads.shp", b"shp".as_slice())], root.path());
        let payload = locate(&archive).unwrap();
        assert!(payload.shp_path.ends_with("data/roads/roads.shp"));
    }

    #[test]
    fn test_locate_rejects_empty_archive() {
        let root = tempfile::tempdir().unwrap();
        let archive = staged(&[("readme.txt", b"hi".as_slice())], root.path());
        assert!(matches!(
            locate(&archive),
            Err(IngestError::NoShapefile)
        ));
    }

    #[test]
    fn test_locate_rejects_multiple_shapefiles() {
        let root = tempfile::tempdir().unwrap();
        let archive = staged(
            &[
                ("roads.shp", b"a".as_slice()),
                ("parks.shp", b"b".as_slice()),
            ],
            root.path(),
        );
        assert!(matches!(
            locate(&archive),
            Err(IngestError::MultipleShapefiles)
        ));
    }

    #[test]
    fn test_locate_rejects_corrupt_archive() {
        let root = tempfile::tempdir().unwrap();
        let archive = stage(b"this is not a zip file", "broken.zip", root.path()).unwrap();
        assert!(matches!(
            locate(&archive),
            Err(IngestError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_extraction_skips_escaping_entries() {
        let root = tempfile::tempdir().unwrap();
        let archive = staged(
            &[
                ("../escape.shp", b"evil".as_slice()),
                ("safe.shp", b"ok".as_slice()),
            ],
            root.path(),
        );
        let payload = locate(&archive).unwrap();
        assert_eq!(payload.shp_path.file_name().unwrap(), "safe.shp");
        assert!(!root.path().parent().unwrap().join("escape.shp").exists());
    }
}

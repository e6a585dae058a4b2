//! Pipeline error taxonomy.
//!
//! Every way an upload can fail maps to one variant, so the API edge can
//! decide status codes and client messages without string matching. The
//! messages here are user-facing: they tell the uploader what was wrong
//! with the archive, not what the pipeline was doing internally.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The upload is not a ZIP archive.
    #[error("Only ZIP archives are accepted")]
    InvalidType,

    /// Scratch-disk trouble while staging or extracting.
    #[error("IO failure during import: {0}")]
    Io(#[from] io::Error),

    /// The ZIP payload could not be read.
    #[error("Could not read the archive: {0}")]
    CorruptArchive(String),

    /// The archive extracted cleanly but holds no `.shp` file.
    #[error("No shapefile (.shp) found in the archive")]
    NoShapefile,

    /// More than one `.shp` file in a single archive.
    #[error("The archive contains multiple shapefiles; upload one shapefile per archive")]
    MultipleShapefiles,

    /// The shapefile parsed but has zero features.
    #[error("The shapefile contains no features")]
    NoFeatures,

    /// The target database cannot create geometry columns.
    #[error("PostGIS is not available on the target database: {0}")]
    SpatialExtensionMissing(String),

    /// The database rejected the import.
    #[error("Import failed: {0}")]
    Import(String),

    /// Anything unanticipated: parser failures, join errors.
    #[error("Failed to process shapefile: {0}")]
    Processing(String),
}

impl IngestError {
    /// Whether the failure is the uploader's fault (a bad archive) rather
    /// than the server's.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidType
                | IngestError::CorruptArchive(_)
                | IngestError::NoShapefile
                | IngestError::MultipleShapefiles
                | IngestError::NoFeatures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(IngestError::InvalidType.is_client_error());
        assert!(IngestError::NoShapefile.is_client_error());
        assert!(!IngestError::Import("boom".to_string()).is_client_error());
        assert!(!IngestError::SpatialExtensionMissing("no postgis".to_string()).is_client_error());
    }
}

//! Archive staging: validate the upload and land it on scratch disk.
//!
//! A staged archive owns a per-upload temp directory; dropping it removes
//! the directory and everything extracted into it, so cleanup happens on
//! every exit path of the pipeline.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::error::IngestError;

/// An upload written to scratch disk, cleaned up on drop.
#[derive(Debug)]
pub struct StagedArchive {
    scratch: TempDir,
    zip_path: PathBuf,
    original_filename: String,
}

impl StagedArchive {
    /// Path of the staged ZIP file.
    pub fn zip_path(&self) -> &Path {
        &self.zip_path
    }

    /// Per-upload scratch directory; extraction happens under here.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// The filename the client sent, used by the table namer.
    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }
}

/// Validate the upload's extension and write it to a fresh scratch
/// directory under `scratch_root`.
///
/// The extension check runs before anything touches disk, so a rejected
/// upload leaves no residue. The staged filename is a fresh token plus a
/// sanitized copy of the client's filename, never the raw client path.
pub fn stage(
    payload: &[u8],
    filename: &str,
    scratch_root: &Path,
) -> Result<StagedArchive, IngestError> {
    let is_zip = Path::new(filename)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if !is_zip {
        return Err(IngestError::InvalidType);
    }

    std::fs::create_dir_all(scratch_root)?;
    let scratch = tempfile::Builder::new()
        .prefix("upload-")
        .tempdir_in(scratch_root)?;

    let token = Uuid::new_v4();
    let zip_path = scratch
        .path()
        .join(format!("{}_{}", token.simple(), sanitize_filename(filename)));
    std::fs::write(&zip_path, payload)?;

    tracing::debug!(
        path = %zip_path.display(),
        bytes = payload.len(),
        "Staged uploaded archive"
    );

    Ok(StagedArchive {
        scratch,
        zip_path,
        original_filename: filename.to_string(),
    })
}

/// Reduce a client-supplied filename to a safe basename: strip any path
/// components and replace everything outside `[A-Za-z0-9._-]`.
fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.zip");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_writes_payload_into_scratch() {
        let root = tempfile::tempdir().unwrap();
        let staged = stage(b"not a real zip", "parks.zip", root.path()).unwrap();

        assert!(staged.zip_path().exists());
        assert!(staged.zip_path().starts_with(root.path()));
        assert_eq!(staged.original_filename(), "parks.zip");
        assert_eq!(std::fs::read(staged.zip_path()).unwrap(), b"not a real zip");
    }

    #[test]
    fn test_stage_accepts_uppercase_extension() {
        let root = tempfile::tempdir().unwrap();
        assert!(stage(b"data", "PARKS.ZIP", root.path()).is_ok());
    }

    #[test]
    fn test_stage_rejects_non_zip_before_touching_disk() {
        let root = tempfile::tempdir().unwrap();
        let err = stage(b"data", "parks.shp", root.path()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidType));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);

        let err = stage(b"data", "no_extension", root.path()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidType));
    }

    #[test]
    fn test_drop_removes_scratch_dir() {
        let root = tempfile::tempdir().unwrap();
        let staged = stage(b"data", "parks.zip", root.path()).unwrap();
        let scratch = staged.scratch_dir().to_path_buf();
        assert!(scratch.exists());
        drop(staged);
        assert!(!scratch.exists());
    }

    #[test]
    fn test_sanitize_filename_strips_paths_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd.zip"), "passwd.zip");
        assert_eq!(sanitize_filename("my data (v2).zip"), "my_data__v2_.zip");
        assert_eq!(sanitize_filename("parks.zip"), "parks.zip");
    }
}

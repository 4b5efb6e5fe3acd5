//! Attachment persistence.

use std::path::Path;

use log::debug;

use crate::error::StorageError;

/// Writes decoded attachment bytes to `path`, replacing any existing file.
///
/// Parent directories are not created; the caller owns directory layout and
/// overwrite policy.
pub fn write_attachment<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<(), StorageError> {
    let path = path.as_ref();
    std::fs::write(path, content).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!("Wrote {} attachment bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_attachment_stores_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.csv");

        write_attachment(&path, b"a,b,c").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"a,b,c");
    }

    #[test]
    fn write_attachment_overwrites_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.csv");
        std::fs::write(&path, b"old contents").unwrap();

        write_attachment(&path, b"new").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn write_attachment_missing_directory_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("report.csv");

        let result = write_attachment(&path, b"a,b,c");

        match result {
            Err(StorageError::WriteFile { path: failed, .. }) => {
                assert!(failed.ends_with("missing/report.csv"));
            }
            other => panic!("expected WriteFile error, got {:?}", other),
        }
    }
}

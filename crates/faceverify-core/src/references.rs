//! Reference image set: the stored samples of the known identity.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("failed to read reference directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// List the reference images in `dir`.
///
/// Every regular, non-hidden file counts, whatever its extension; a file
/// that fails to decode is reported later rather than silently skipped.
/// Entries are sorted by file name so logs and score order are stable.
pub fn scan(dir: &Path) -> Result<Vec<PathBuf>, ReferenceError> {
    let read_err = |source| ReferenceError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    tracing::debug!(dir = %dir.display(), count = paths.len(), "scanned reference images");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_sorted_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jpg", "a.jpg", "b.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"x").unwrap();

        let names: Vec<String> = scan(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.jpg"]);
    }

    #[test]
    fn test_scan_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(&dir.path().join("verification_images"));
        assert!(matches!(result, Err(ReferenceError::ReadDir { .. })));
    }
}

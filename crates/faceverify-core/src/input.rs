//! The persisted input image: the single file verification reads from.

use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Write `frame` to `path`, replacing whatever was there.
///
/// The encoding follows the file extension (`.jpg` by default config).
pub fn persist(frame: &RgbImage, path: &Path) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PersistError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    frame.save(path).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        path = %path.display(),
        width = frame.width(),
        height = frame.height(),
        "persisted input image"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_persist_creates_parent_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input_image").join("input_image.jpg");

        persist(&RgbImage::from_pixel(250, 250, Rgb([10, 10, 10])), &path).unwrap();
        persist(&RgbImage::from_pixel(40, 30, Rgb([200, 200, 200])), &path).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (40, 30));
    }

    #[test]
    fn test_persist_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let result = persist(
            &RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])),
            &dir.path().join("input.unknownext"),
        );
        assert!(matches!(result, Err(PersistError::Write { .. })));
    }
}

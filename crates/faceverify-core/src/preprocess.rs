//! Image preprocessing for the Siamese network.
//!
//! Both the captured input image and every reference image go through the
//! same path: decode, convert to RGB, bilinear resize to 105x105, scale to
//! [0, 1], lay out as a single NHWC batch.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Side length of the square network input.
pub const INPUT_SIZE: usize = 105;

/// Preprocessed image, shape `[1, INPUT_SIZE, INPUT_SIZE, 3]`.
pub type ImageTensor = Array4<f32>;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Read and preprocess an image file.
pub fn load_tensor(path: &Path) -> Result<ImageTensor, PreprocessError> {
    let bytes = std::fs::read(path).map_err(|source| PreprocessError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let img = image::load_from_memory(&bytes).map_err(|source| PreprocessError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(to_tensor(&img))
}

/// Preprocess an already-decoded image.
pub fn to_tensor(img: &DynamicImage) -> ImageTensor {
    let rgb = img.to_rgb8();
    let resized = resize(&rgb);

    let mut tensor = Array4::<f32>::zeros((1, INPUT_SIZE, INPUT_SIZE, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
        }
    }
    tensor
}

fn resize(rgb: &RgbImage) -> RgbImage {
    let size = INPUT_SIZE as u32;
    if rgb.dimensions() == (size, size) {
        return rgb.clone();
    }
    image::imageops::resize(rgb, size, size, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;

    fn checkerboard(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([255, 40, 0])
            } else {
                Rgb([0, 90, 255])
            }
        })
    }

    #[test]
    fn test_tensor_shape() {
        let tensor = to_tensor(&DynamicImage::ImageRgb8(checkerboard(250, 250)));
        assert_eq!(tensor.shape(), &[1, INPUT_SIZE, INPUT_SIZE, 3]);
    }

    #[test]
    fn test_values_in_unit_interval() {
        let tensor = to_tensor(&DynamicImage::ImageRgb8(checkerboard(300, 200)));
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_normalization_exact_at_native_size() {
        let img = RgbImage::from_pixel(105, 105, Rgb([255, 0, 51]));
        let tensor = to_tensor(&DynamicImage::ImageRgb8(img));
        assert_abs_diff_eq!(tensor[[0, 10, 20, 0]], 1.0);
        assert_abs_diff_eq!(tensor[[0, 10, 20, 1]], 0.0);
        assert_abs_diff_eq!(tensor[[0, 10, 20, 2]], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_grayscale_input_expands_to_rgb() {
        let gray = image::GrayImage::from_pixel(50, 50, image::Luma([102]));
        let tensor = to_tensor(&DynamicImage::ImageLuma8(gray));
        assert_abs_diff_eq!(tensor[[0, 0, 0, 0]], 0.4, epsilon = 1e-6);
        assert_eq!(tensor[[0, 0, 0, 0]], tensor[[0, 0, 0, 2]]);
    }

    #[test]
    fn test_same_bytes_yield_identical_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.png");
        checkerboard(250, 250).save(&path).unwrap();

        let first = load_tensor(&path).unwrap();
        let second = load_tensor(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tensor(&dir.path().join("input_image.jpg")).unwrap_err();
        assert!(matches!(err, PreprocessError::Read { .. }));
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_tensor(&path).unwrap_err();
        assert!(matches!(err, PreprocessError::Decode { .. }));
    }
}

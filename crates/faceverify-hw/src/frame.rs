//! Frame type and pixel conversion — YUYV/GREY to RGB, dark detection, cropping.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A captured RGB camera frame (3 bytes per pixel, row-major).
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

/// Fixed rectangle cut out of every captured frame before display and verification.
///
/// The default window assumes a 640x480 capture. It is never clamped to the
/// camera's resolution: a frame that cannot contain it fails with
/// [`FrameError::CropOutOfBounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self {
            x: 200,
            y: 120,
            width: 250,
            height: 250,
        }
    }
}

impl CropRegion {
    /// Whether a `width` x `height` frame fully contains this region.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        // u64 so that x + width cannot overflow
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

impl std::str::FromStr for CropRegion {
    type Err = FrameError;

    /// Parse `"x,y,width,height"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| FrameError::InvalidRegion(s.to_string()))?;

        match parts.as_slice() {
            &[x, y, width, height] if width > 0 && height > 0 => Ok(Self {
                x,
                y,
                width,
                height,
            }),
            _ => Err(FrameError::InvalidRegion(s.to_string())),
        }
    }
}

impl Frame {
    /// Build a frame from packed RGB bytes, flagging it dark if needed.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        let is_dark = is_dark_frame(&data, 0.95);
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        })
    }

    /// Average luma brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let pixels = self.data.len() / 3;
        self.data
            .chunks_exact(3)
            .map(|px| luma(px[0], px[1], px[2]) as f32)
            .sum::<f32>()
            / pixels as f32
    }

    /// Copy out `region` as a new frame.
    pub fn crop(&self, region: &CropRegion) -> Result<Frame, FrameError> {
        if !region.fits(self.width, self.height) {
            return Err(FrameError::CropOutOfBounds {
                region: *region,
                width: self.width,
                height: self.height,
            });
        }

        let src_stride = self.width as usize * 3;
        let row_bytes = region.width as usize * 3;
        let mut data = Vec::with_capacity(row_bytes * region.height as usize);
        for y in region.y as usize..(region.y + region.height) as usize {
            let start = y * src_stride + region.x as usize * 3;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }

        Ok(Frame {
            is_dark: is_dark_frame(&data, 0.95),
            data,
            width: region.width,
            height: region.height,
            timestamp: self.timestamp,
            sequence: self.sequence,
        })
    }

    /// Copy the pixels into an `image` buffer for encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: (self.width as usize) * (self.height as usize) * 3,
                actual: self.data.len(),
            },
        )
    }
}

/// ITU-R BT.601 luma of one RGB pixel.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Expand 8-bit grayscale to RGB by replicating the channel.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    if gray.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: gray.len(),
        });
    }
    Ok(gray[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
}

/// BT.601 full-range YUV → RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Check if an RGB frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(rgb: &[u8], threshold_pct: f32) -> bool {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return true;
    }
    let dark_count = rgb
        .chunks_exact(3)
        .filter(|px| luma(px[0], px[1], px[2]) < 32)
        .count();
    (dark_count as f32 / pixels as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error(
        "crop region {}x{}+{}+{} does not fit a {width}x{height} frame",
        .region.width, .region.height, .region.x, .region.y
    )]
    CropOutOfBounds {
        region: CropRegion,
        width: u32,
        height: u32,
    },
    #[error("invalid crop region {0:?}: expected x,y,width,height")]
    InvalidRegion(String),
}

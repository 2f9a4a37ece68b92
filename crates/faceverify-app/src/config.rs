use faceverify_core::{Thresholds, VerifyError};
use faceverify_hw::CropRegion;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration.
///
/// Loaded from an optional TOML file (`FACEVERIFY_CONFIG`), then overridden
/// by `FACEVERIFY_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 camera index, opened as `/dev/video{index}` (default: 0).
    pub camera_index: usize,
    /// Base directory for the input image, references, and model.
    pub data_dir: PathBuf,
    /// Where the captured frame is written before each verification.
    pub input_image: Option<PathBuf>,
    /// Directory of reference images of the known identity.
    pub reference_dir: Option<PathBuf>,
    /// Siamese network exported to ONNX.
    pub model_path: Option<PathBuf>,
    /// Minimum score for one comparison to count as a positive.
    pub detection_threshold: f32,
    /// Minimum fraction of positives required to verify.
    pub verification_threshold: f32,
    /// Region cut out of each camera frame.
    pub crop: CropRegion,
    /// Preview refresh interval in milliseconds.
    pub refresh_interval_ms: u64,
    /// Number of frames to discard after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: 0,
            data_dir: default_data_dir(),
            input_image: None,
            reference_dir: None,
            model_path: None,
            detection_threshold: 0.5,
            verification_threshold: 0.5,
            crop: CropRegion::default(),
            refresh_interval_ms: 10,
            warmup_frames: 4,
        }
    }
}

impl Config {
    /// Load configuration from the optional config file and `FACEVERIFY_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("FACEVERIFY_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parsed(&lookup, "FACEVERIFY_CAMERA_INDEX") {
            self.camera_index = v;
        }
        if let Some(v) = lookup("FACEVERIFY_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEVERIFY_INPUT_IMAGE") {
            self.input_image = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FACEVERIFY_REFERENCE_DIR") {
            self.reference_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FACEVERIFY_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = parsed(&lookup, "FACEVERIFY_DETECTION_THRESHOLD") {
            self.detection_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "FACEVERIFY_VERIFICATION_THRESHOLD") {
            self.verification_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "FACEVERIFY_CROP") {
            self.crop = v;
        }
        if let Some(v) = parsed(&lookup, "FACEVERIFY_REFRESH_MS") {
            self.refresh_interval_ms = v;
        }
        if let Some(v) = parsed(&lookup, "FACEVERIFY_WARMUP_FRAMES") {
            self.warmup_frames = v;
        }
    }

    pub fn input_image_path(&self) -> PathBuf {
        self.input_image
            .clone()
            .unwrap_or_else(|| self.data_dir.join("input_image").join("input_image.jpg"))
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.reference_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("verification_images"))
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("siamese_model.onnx"))
    }

    /// Validated decision thresholds.
    pub fn thresholds(&self) -> Result<Thresholds, VerifyError> {
        Thresholds::new(self.detection_threshold, self.verification_threshold)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceverify")
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config override");
            None
        }
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::detection_params::DetectionParams;
use crate::remote::domain::scan_mode::ScanMode;
use crate::shared::constants::{
    APP_DIR_NAME, DEFAULT_ATTENDANCE_URL, DEFAULT_CROP_PADDING, DEFAULT_DIRECTORY_URL,
    DEFAULT_JPEG_QUALITY, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECOGNITION_URL,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_THROTTLE_WINDOW_MS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Scanner configuration, persisted as JSON.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub poll_interval_ms: u64,
    pub throttle_window_ms: u64,
    pub crop_padding: u32,
    pub jpeg_quality: u8,
    pub request_timeout_secs: u64,
    pub attendance_url: String,
    pub directory_url: String,
    pub recognition_url: String,
    /// Enroll faces with the recognition service after creating the
    /// directory record, for directories that do not enroll on create.
    pub separate_enrollment: bool,
    pub mode: ScanMode,
    pub detection: DetectionParams,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            throttle_window_ms: DEFAULT_THROTTLE_WINDOW_MS,
            crop_padding: DEFAULT_CROP_PADDING,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            attendance_url: DEFAULT_ATTENDANCE_URL.to_string(),
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            recognition_url: DEFAULT_RECOGNITION_URL.to_string(),
            separate_enrollment: false,
            mode: ScanMode::default(),
            detection: DetectionParams::default(),
        }
    }
}

impl ScannerConfig {
    /// Platform config location: `<config_dir>/Attendance Scanner/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the platform config file if present, otherwise defaults.
    ///
    /// A file that exists but cannot be parsed is reported and ignored.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config file: {e}");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        self.detection.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

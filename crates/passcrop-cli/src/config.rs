use passcrop_core::{BuildProfile, DetectorBackend, HeadSizeBand, ViewportLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Effective configuration: defaults, then an optional TOML file, then
/// `PASSCROP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Release builds are always production.
    pub profile: BuildProfile,
    pub detector: DetectorBackend,
    /// Directory containing the SCRFD model (det_10g.onnx).
    pub model_dir: PathBuf,
    /// Where cropped and resized photos are written.
    pub work_dir: PathBuf,
    /// Horizontal padding around the crop frame, in container pixels.
    pub crop_padding: f64,
    pub min_scale: f64,
    pub max_scale_cap: f64,
    /// Side of the final square photo in pixels.
    pub output_size: u32,
    pub crop_quality: f32,
    pub resize_quality: f32,
    pub head_min_pct: f64,
    pub head_max_pct: f64,
    pub crop_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let limits = ViewportLimits::default();
        let band = HeadSizeBand::default();
        Self {
            profile: BuildProfile::default(),
            detector: DetectorBackend::default(),
            model_dir: passcrop_core::default_model_dir(),
            work_dir: std::env::temp_dir().join("passcrop"),
            crop_padding: 20.0,
            min_scale: limits.min_scale,
            max_scale_cap: limits.max_scale_cap,
            output_size: 600,
            crop_quality: 1.0,
            resize_quality: 0.9,
            head_min_pct: band.min_pct,
            head_max_pct: band.max_pct,
            crop_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load from `file` (or `PASSCROP_CONFIG`) and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os("PASSCROP_CONFIG").map(PathBuf::from);
        let mut config = match file.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Apply `PASSCROP_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "PASSCROP_PROFILE", &mut self.profile)?;
        override_parsed(&lookup, "PASSCROP_DETECTOR", &mut self.detector)?;
        if let Some(dir) = lookup("PASSCROP_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("PASSCROP_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        override_parsed(&lookup, "PASSCROP_CROP_PADDING", &mut self.crop_padding)?;
        override_parsed(&lookup, "PASSCROP_MIN_SCALE", &mut self.min_scale)?;
        override_parsed(&lookup, "PASSCROP_MAX_SCALE_CAP", &mut self.max_scale_cap)?;
        override_parsed(&lookup, "PASSCROP_OUTPUT_SIZE", &mut self.output_size)?;
        override_parsed(&lookup, "PASSCROP_CROP_QUALITY", &mut self.crop_quality)?;
        override_parsed(&lookup, "PASSCROP_RESIZE_QUALITY", &mut self.resize_quality)?;
        override_parsed(&lookup, "PASSCROP_HEAD_MIN_PCT", &mut self.head_min_pct)?;
        override_parsed(&lookup, "PASSCROP_HEAD_MAX_PCT", &mut self.head_max_pct)?;
        override_parsed(&lookup, "PASSCROP_CROP_TIMEOUT_SECS", &mut self.crop_timeout_secs)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile == BuildProfile::Development && BuildProfile::default() == BuildProfile::Production {
            return Err(ConfigError::Invalid(
                "development profile cannot be selected in a release build".into(),
            ));
        }
        if !(self.crop_padding >= 0.0 && self.crop_padding.is_finite()) {
            return Err(ConfigError::Invalid(format!("crop_padding {}", self.crop_padding)));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale_cap) {
            return Err(ConfigError::Invalid(format!(
                "need 0 < min_scale <= max_scale_cap, got {} and {}",
                self.min_scale, self.max_scale_cap
            )));
        }
        if self.output_size == 0 {
            return Err(ConfigError::Invalid("output_size must be > 0".into()));
        }
        for (name, q) in [("crop_quality", self.crop_quality), ("resize_quality", self.resize_quality)] {
            if !(0.0..=1.0).contains(&q) {
                return Err(ConfigError::Invalid(format!("{name} {q} outside [0, 1]")));
            }
        }
        if !(0.0 <= self.head_min_pct && self.head_min_pct <= self.head_max_pct && self.head_max_pct <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "head band {}..{} is not within 0..100",
                self.head_min_pct, self.head_max_pct
            )));
        }
        if self.crop_timeout_secs == 0 {
            return Err(ConfigError::Invalid("crop_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn limits(&self) -> ViewportLimits {
        ViewportLimits {
            min_scale: self.min_scale,
            max_scale_cap: self.max_scale_cap,
        }
    }

    pub fn band(&self) -> HeadSizeBand {
        HeadSizeBand {
            min_pct: self.head_min_pct,
            max_pct: self.head_max_pct,
        }
    }

    pub fn crop_timeout(&self) -> Duration {
        Duration::from_secs(self.crop_timeout_secs)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    Ok(())
}

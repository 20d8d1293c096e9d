//! Face-detection capability and its provider selection.
//!
//! The backend is chosen once at startup. The deterministic mock exists for
//! development only and can never be wired into a production build.

use crate::detector::{ScrfdDetector, SCRFD_MODEL_FILE};
use crate::types::{FaceBounds, FaceDetection};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download det_10g.onnx from insightface into the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face detection unavailable: {0}")]
    FaceDetectionUnavailable(String),
    #[error("mock face detection is not allowed in a production build")]
    MockForbidden,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face-detection backend: on-device model or development mock.
pub trait FaceDetector: Send {
    fn name(&self) -> &'static str;

    /// Detect faces, with bounds in `image` pixel space.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceDetection>, DetectorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    Development,
    Production,
}

impl Default for BuildProfile {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            BuildProfile::Development
        } else {
            BuildProfile::Production
        }
    }
}

impl FromStr for BuildProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(BuildProfile::Development),
            "production" | "prod" => Ok(BuildProfile::Production),
            other => Err(format!("unknown build profile '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// SCRFD if the model is present; in development, mock otherwise.
    #[default]
    Auto,
    Scrfd,
    Mock,
}

impl FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DetectorBackend::Auto),
            "scrfd" => Ok(DetectorBackend::Scrfd),
            "mock" => Ok(DetectorBackend::Mock),
            other => Err(format!("unknown detector backend '{other}'")),
        }
    }
}

/// Shape of the synthetic face, in fractions of the photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockFaceSettings {
    pub height_fraction: f64,
    /// Face width over face height.
    pub aspect: f64,
    pub top_fraction: f64,
    pub eye_open_probability: f32,
}

impl Default for MockFaceSettings {
    fn default() -> Self {
        Self {
            height_fraction: 0.60,
            aspect: 0.8,
            top_fraction: 0.15,
            eye_open_probability: 0.9,
        }
    }
}

/// Reports one horizontally centred face of fixed proportions.
#[derive(Debug)]
pub struct MockFaceDetector {
    settings: MockFaceSettings,
}

impl MockFaceDetector {
    /// Fails with `MockForbidden` unless `profile` is development.
    pub fn new(profile: BuildProfile, settings: MockFaceSettings) -> Result<Self, DetectorError> {
        if profile == BuildProfile::Production {
            return Err(DetectorError::MockForbidden);
        }
        tracing::warn!("using mock face detection (development only)");
        Ok(Self { settings })
    }
}

impl FaceDetector for MockFaceDetector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceDetection>, DetectorError> {
        let (w, h) = (image.width() as f64, image.height() as f64);
        let height = h * self.settings.height_fraction;
        let width = height * self.settings.aspect;
        Ok(vec![FaceDetection {
            bounds: FaceBounds {
                x: (w - width) / 2.0,
                y: h * self.settings.top_fraction,
                width,
                height,
            },
            confidence: 1.0,
            left_eye_open_probability: Some(self.settings.eye_open_probability),
            right_eye_open_probability: Some(self.settings.eye_open_probability),
        }])
    }
}

/// Default directory holding the ONNX models.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/passcrop/models")
}

/// Build the detector for this process.
///
/// Production never falls back: a missing model is
/// `FaceDetectionUnavailable`, and asking for the mock is `MockForbidden`.
pub fn select_detector(
    profile: BuildProfile,
    backend: DetectorBackend,
    model_dir: &Path,
) -> Result<Box<dyn FaceDetector>, DetectorError> {
    let model_path = model_dir.join(SCRFD_MODEL_FILE);

    let detector: Box<dyn FaceDetector> = match (backend, profile) {
        (DetectorBackend::Mock, _) => {
            Box::new(MockFaceDetector::new(profile, MockFaceSettings::default())?)
        }
        (DetectorBackend::Scrfd, _) | (DetectorBackend::Auto, BuildProfile::Production) => {
            Box::new(ScrfdDetector::load(&model_path).map_err(|e| match e {
                DetectorError::ModelNotFound(path) => DetectorError::FaceDetectionUnavailable(
                    format!("model missing at {path}"),
                ),
                other => other,
            })?)
        }
        (DetectorBackend::Auto, BuildProfile::Development) => {
            if model_path.exists() {
                Box::new(ScrfdDetector::load(&model_path)?)
            } else {
                tracing::warn!(
                    path = %model_path.display(),
                    "SCRFD model not found; falling back to mock detection"
                );
                Box::new(MockFaceDetector::new(profile, MockFaceSettings::default())?)
            }
        }
    };

    tracing::info!(backend = detector.name(), ?profile, "face detector ready");
    Ok(detector)
}

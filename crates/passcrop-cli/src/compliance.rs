use passcrop_core::{evaluate_faces, FaceDetector, GeometryError, HeadSizeBand, HeadSizeOutcome};
use passcrop_imaging::ProcessError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("failed to load photo: {0}")]
    Load(#[from] ProcessError),
    #[error("face detection failed: {0}")]
    DetectionFailed(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub photo: PathBuf,
    pub width: u32,
    pub height: u32,
    pub detector: &'static str,
    pub faces: usize,
    pub outcome: HeadSizeOutcome,
    pub message: String,
}

/// Head-size check on finished photos. The detector is shared and used by
/// one check at a time.
pub struct ComplianceChecker {
    detector: Arc<Mutex<Box<dyn FaceDetector>>>,
    band: HeadSizeBand,
}

impl ComplianceChecker {
    pub fn new(detector: Box<dyn FaceDetector>, band: HeadSizeBand) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
            band,
        }
    }

    pub async fn check(&self, photo: &Path) -> Result<ComplianceReport, ComplianceError> {
        let detector = Arc::clone(&self.detector);
        let path = photo.to_path_buf();

        let (image, faces, name) = tokio::task::spawn_blocking(move || {
            let image = passcrop_imaging::decode_oriented(&path)?;
            let mut detector = detector
                .lock()
                .map_err(|_| ComplianceError::DetectionFailed("detector lock poisoned".into()))?;
            let faces = detector
                .detect(&image)
                .map_err(|e| ComplianceError::DetectionFailed(e.to_string()))?;
            Ok::<_, ComplianceError>((image, faces, detector.name()))
        })
        .await
        .map_err(|e| ComplianceError::DetectionFailed(format!("detection task aborted: {e}")))??;

        let outcome = evaluate_faces(&faces, image.height(), &self.band)?;
        let message = outcome.message(&self.band);
        tracing::info!(
            photo = %photo.display(),
            detector = name,
            faces = faces.len(),
            ?outcome,
            "head size checked"
        );

        Ok(ComplianceReport {
            photo: photo.to_path_buf(),
            width: image.width(),
            height: image.height(),
            detector: name,
            faces: faces.len(),
            outcome,
            message,
        })
    }
}

//! Head height as a share of the final photo, for passport compliance.

use crate::layout::GeometryError;
use crate::types::{FaceBounds, FaceDetection};
use serde::{Deserialize, Serialize};

/// Print resolution of the canonical 600 px / 2 in US photo.
pub const PASSPORT_DPI: f64 = 300.0;

const US_HEAD_MIN_PCT: f64 = 50.0;
const US_HEAD_MAX_PCT: f64 = 69.0;

/// Inclusive band of acceptable head heights, in percent of photo height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadSizeBand {
    pub min_pct: f64,
    pub max_pct: f64,
}

impl Default for HeadSizeBand {
    fn default() -> Self {
        Self {
            min_pct: US_HEAD_MIN_PCT,
            max_pct: US_HEAD_MAX_PCT,
        }
    }
}

impl HeadSizeBand {
    pub fn classify(&self, percentage: f64) -> HeadSizeVerdict {
        if percentage < self.min_pct {
            HeadSizeVerdict::TooSmall { percentage }
        } else if percentage > self.max_pct {
            HeadSizeVerdict::TooLarge { percentage }
        } else {
            HeadSizeVerdict::Valid { percentage }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum HeadSizeVerdict {
    Valid { percentage: f64 },
    TooSmall { percentage: f64 },
    TooLarge { percentage: f64 },
}

impl HeadSizeVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, HeadSizeVerdict::Valid { .. })
    }

    pub fn percentage(&self) -> f64 {
        match *self {
            HeadSizeVerdict::Valid { percentage }
            | HeadSizeVerdict::TooSmall { percentage }
            | HeadSizeVerdict::TooLarge { percentage } => percentage,
        }
    }
}

/// Result of a head-size check. Every variant is user guidance, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HeadSizeOutcome {
    NoFaceDetected,
    MultipleFacesDetected { count: usize },
    Measured {
        verdict: HeadSizeVerdict,
        /// Physical head height at [`PASSPORT_DPI`].
        head_height_inches: f64,
    },
}

impl HeadSizeOutcome {
    pub fn message(&self, band: &HeadSizeBand) -> String {
        match self {
            HeadSizeOutcome::NoFaceDetected => {
                "No face detected. Face the camera in good light and retake the photo.".to_string()
            }
            HeadSizeOutcome::MultipleFacesDetected { count } => format!(
                "{count} faces detected. Only the applicant may appear in the photo."
            ),
            HeadSizeOutcome::Measured { verdict, head_height_inches } => match verdict {
                HeadSizeVerdict::Valid { percentage } => format!(
                    "Head size acceptable: {percentage:.1}% of photo height ({head_height_inches:.2}\")"
                ),
                HeadSizeVerdict::TooSmall { percentage } => format!(
                    "Head too small: {percentage:.1}% of photo height, need at least {:.0}%. Zoom in.",
                    band.min_pct
                ),
                HeadSizeVerdict::TooLarge { percentage } => format!(
                    "Head too large: {percentage:.1}% of photo height, need at most {:.0}%. Zoom out.",
                    band.max_pct
                ),
            },
        }
    }
}

/// Face height as a percentage of `image_height`, clamped to [0, 100].
pub fn head_height_percentage(bounds: &FaceBounds, image_height: u32) -> Result<f64, GeometryError> {
    if image_height == 0 {
        return Err(GeometryError::InvalidDimensions("photo height 0".into()));
    }
    if !bounds.height.is_finite() {
        return Err(GeometryError::InvalidDimensions(format!(
            "face height {}",
            bounds.height
        )));
    }
    Ok((bounds.height / image_height as f64 * 100.0).clamp(0.0, 100.0))
}

/// Physical size of a pixel length at `dpi`.
pub fn pixels_to_inches(pixels: f64, dpi: f64) -> f64 {
    pixels / dpi
}

/// Check the detections for one final photo. Exactly one face is required.
pub fn evaluate_faces(
    faces: &[FaceDetection],
    image_height: u32,
    band: &HeadSizeBand,
) -> Result<HeadSizeOutcome, GeometryError> {
    let face = match faces {
        [] => return Ok(HeadSizeOutcome::NoFaceDetected),
        [face] => face,
        _ => {
            return Ok(HeadSizeOutcome::MultipleFacesDetected {
                count: faces.len(),
            })
        }
    };

    let percentage = head_height_percentage(&face.bounds, image_height)?;
    let verdict = band.classify(percentage);
    let head_height_inches = pixels_to_inches(face.bounds.height.max(0.0), PASSPORT_DPI);

    tracing::debug!(
        face_height = face.bounds.height,
        image_height,
        percentage,
        ?verdict,
        "head size measured"
    );

    Ok(HeadSizeOutcome::Measured {
        verdict,
        head_height_inches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(height: f64) -> FaceDetection {
        FaceDetection {
            bounds: FaceBounds { x: 100.0, y: 50.0, width: height * 0.8, height },
            confidence: 0.99,
            left_eye_open_probability: None,
            right_eye_open_probability: None,
        }
    }

    #[test]
    fn test_percentage() {
        let p = head_height_percentage(&face(250.0).bounds, 500).unwrap();
        assert_eq!(p, 50.0);
        let p = head_height_percentage(&face(249.0).bounds, 500).unwrap();
        assert!((p - 49.8).abs() < 1e-9);
    }

    #[test]
    fn test_percentage_clamped() {
        assert_eq!(head_height_percentage(&face(900.0).bounds, 500).unwrap(), 100.0);
        assert_eq!(head_height_percentage(&face(-5.0).bounds, 500).unwrap(), 0.0);
    }

    #[test]
    fn test_percentage_zero_height_photo() {
        assert!(head_height_percentage(&face(100.0).bounds, 0).is_err());
    }

    #[test]
    fn test_band_edges() {
        let band = HeadSizeBand::default();
        assert!(band.classify(50.0).is_valid());
        assert!(band.classify(69.0).is_valid());
        assert!(matches!(band.classify(49.8), HeadSizeVerdict::TooSmall { .. }));
        assert!(matches!(band.classify(69.1), HeadSizeVerdict::TooLarge { .. }));
    }

    #[test]
    fn test_evaluate_lower_bound_is_valid() {
        let band = HeadSizeBand::default();
        let outcome = evaluate_faces(&[face(250.0)], 500, &band).unwrap();
        match outcome {
            HeadSizeOutcome::Measured { verdict, .. } => {
                assert_eq!(verdict, HeadSizeVerdict::Valid { percentage: 50.0 })
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_evaluate_just_below_is_too_small() {
        let band = HeadSizeBand::default();
        let outcome = evaluate_faces(&[face(249.0)], 500, &band).unwrap();
        let HeadSizeOutcome::Measured { verdict, .. } = outcome else {
            panic!("expected a measurement");
        };
        assert!(matches!(verdict, HeadSizeVerdict::TooSmall { .. }));
        assert!((verdict.percentage() - 49.8).abs() < 1e-9);
        assert!(outcome.message(&band).contains("49.8%"));
    }

    #[test]
    fn test_evaluate_face_count() {
        let band = HeadSizeBand::default();
        assert_eq!(
            evaluate_faces(&[], 600, &band).unwrap(),
            HeadSizeOutcome::NoFaceDetected
        );
        assert_eq!(
            evaluate_faces(&[face(300.0), face(310.0)], 600, &band).unwrap(),
            HeadSizeOutcome::MultipleFacesDetected { count: 2 }
        );
    }

    #[test]
    fn test_inches_at_passport_dpi() {
        let band = HeadSizeBand::default();
        let outcome = evaluate_faces(&[face(360.0)], 600, &band).unwrap();
        let HeadSizeOutcome::Measured { head_height_inches, verdict } = outcome else {
            panic!("expected a measurement");
        };
        assert!((head_height_inches - 1.2).abs() < 1e-9);
        assert!(verdict.is_valid());
    }

    #[test]
    fn test_outcome_serializes_with_tags() {
        let json = serde_json::to_value(HeadSizeOutcome::MultipleFacesDetected { count: 3 }).unwrap();
        assert_eq!(json["outcome"], "multiple_faces_detected");
        assert_eq!(json["count"], 3);
    }
}

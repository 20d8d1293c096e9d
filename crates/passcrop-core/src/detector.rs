//! On-device SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the photo to the 640x640 model input, decodes the three
//! anchor-free stride heads and suppresses overlaps. Only boxes are decoded;
//! the head-size check does not need landmarks.

use crate::provider::{DetectorError, FaceDetector};
use crate::types::{FaceBounds, FaceDetection};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// File name of the detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// Maps letterboxed model coordinates back to photo pixels.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn for_image(width: u32, height: u32) -> Self {
        let side = SCRFD_INPUT_SIZE as f32;
        let scale = (side / width as f32).min(side / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((side - new_w) / 2.0).floor(),
            pad_y: ((side - new_h) / 2.0).floor(),
        }
    }

    fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Box in photo pixels with its score, before suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    fn into_detection(self) -> FaceDetection {
        FaceDetection {
            bounds: FaceBounds {
                x: self.x1 as f64,
                y: self.y1 as f64,
                width: (self.x2 - self.x1) as f64,
                height: (self.y2 - self.y1) as f64,
            },
            confidence: self.score,
            left_eye_open_probability: None,
            right_eye_open_probability: None,
        }
    }
}

pub struct ScrfdDetector {
    session: Session,
    /// Output tensor indices (score, bbox) per stride.
    heads: [(usize, usize); 3],
}

impl ScrfdDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                names.len()
            )));
        }
        let heads = output_heads(&names);

        tracing::info!(path = %model_path.display(), outputs = ?names, ?heads, "loaded SCRFD model");

        Ok(Self { session, heads })
    }

    fn preprocess(image: &DynamicImage) -> (Array4<f32>, Letterbox) {
        let letterbox = Letterbox::for_image(image.width(), image.height());
        let new_w = ((image.width() as f32 * letterbox.scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let new_h = ((image.height() as f32 * letterbox.scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let resized = image::imageops::resize(&image.to_rgb8(), new_w, new_h, FilterType::Triangle);

        let side = SCRFD_INPUT_SIZE as usize;
        // Zero after normalisation is the mean colour, i.e. the padding
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        let (pad_x, pad_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
            if tx >= side || ty >= side {
                continue;
            }
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, letterbox)
    }
}

impl FaceDetector for ScrfdDetector {
    fn name(&self) -> &'static str {
        "scrfd"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceDetection>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = Self::preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.heads[slot];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, boxes, stride, &letterbox));
        }

        let faces: Vec<FaceDetection> = suppress(candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .map(Candidate::into_detection)
            .collect();

        tracing::debug!(count = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Find (score, bbox) outputs per stride by name ("score_8", "bbox_8", ...),
/// falling back to the standard export order when names are generic.
fn output_heads(names: &[String]) -> [(usize, usize); 3] {
    let position = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<(usize, usize)>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((position("score", stride)?, position("bbox", stride)?)))
        .collect();

    match named {
        Some(heads) => [heads[0], heads[1], heads[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

fn decode_stride(scores: &[f32], boxes: &[f32], stride: usize, letterbox: &Letterbox) -> Vec<Candidate> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= SCRFD_CONFIDENCE_THRESHOLD {
                return None;
            }
            let offsets = boxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.to_image(cx - offsets[0] * step, cy - offsets[1] * step);
            let (x2, y2) = letterbox.to_image(cx + offsets[2] * step, cy + offsets[3] * step);
            Some(Candidate { x1, y1, x2, y2, score })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x: f32, y: f32, w: f32, h: f32, score: f32) -> Candidate {
        Candidate { x1: x, y1: y, x2: x + w, y2: y + h, score }
    }

    #[test]
    fn test_iou() {
        let a = cand(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!(a.iou(&cand(20.0, 20.0, 10.0, 10.0, 1.0)).abs() < 1e-6);
        // 50 overlap over 150 union
        assert!((a.iou(&cand(5.0, 0.0, 10.0, 10.0, 1.0)) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_keeps_best_of_overlapping() {
        let kept = suppress(
            vec![
                cand(5.0, 5.0, 100.0, 100.0, 0.8),
                cand(200.0, 200.0, 50.0, 50.0, 0.7),
                cand(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            0.4,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn test_suppress_empty() {
        assert!(suppress(Vec::new(), 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_roundtrip() {
        let lb = Letterbox::for_image(320, 240);
        // 320x240 scales by 2 to 640x480, padded 80 top and bottom
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
        let (x, y) = lb.to_image(100.0 * 2.0, 50.0 * 2.0 + 80.0);
        assert!((x - 100.0).abs() < 1e-4);
        assert!((y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_output_heads_named_and_positional() {
        let shuffled: Vec<String> = ["bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(output_heads(&shuffled), [(1, 0), (3, 2), (5, 4)]);

        let generic: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(output_heads(&generic), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_decode_stride_maps_to_image_space() {
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let grid = 640 / 32;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut boxes = vec![0.0f32; anchors * 4];

        // Second anchor of cell (2, 1) at (64, 32)
        let idx = (grid + 2) * SCRFD_ANCHORS_PER_CELL + 1;
        scores[idx] = 0.9;
        boxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 2.0, 3.0]);

        let found = decode_stride(&scores, &boxes, 32, &lb);
        assert_eq!(found.len(), 1);
        let c = found[0];
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (32.0, 0.0, 128.0, 128.0));
    }

    #[test]
    fn test_preprocess_pads_with_mean() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(64, 32, image::Rgb([255, 255, 255])));
        let (tensor, lb) = ScrfdDetector::preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(lb.pad_y, 160.0);
        // Padding row is zero, photo row is (255 - 127.5) / 128
        assert_eq!(tensor[[0, 0, 0, 320]], 0.0);
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 1, 320, 320]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_load_missing_model() {
        let result = ScrfdDetector::load(Path::new("/nonexistent/det_10g.onnx"));
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }
}

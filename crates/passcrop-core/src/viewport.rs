//! Live zoom/pan state driven by pinch and pan gestures.
//!
//! The transform is always recomputed from the baseline saved at gesture start
//! plus the cumulative pinch factor and pan delta of the running gesture, so a
//! simultaneous pinch and pan compose additively instead of compounding
//! per-event error. Updates are synchronous and never suspend.

use crate::layout::{CropFrame, DisplayedLayout};
use crate::types::{Point, Vector};
use serde::{Deserialize, Serialize};

const DEFAULT_MIN_SCALE: f64 = 0.5;
const DEFAULT_MAX_SCALE_CAP: f64 = 3.0;

/// Uniform zoom on top of the contain fit, then a pan in container pixels.
/// Scaling is anchored at the photo's own centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportTransform {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl ViewportTransform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        translate_x: 0.0,
        translate_y: 0.0,
    };
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Zoom policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportLimits {
    pub min_scale: f64,
    /// Upper zoom bound, raised automatically when the crop frame needs more
    /// zoom to be filled by the shorter displayed side.
    pub max_scale_cap: f64,
}

impl Default for ViewportLimits {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            max_scale_cap: DEFAULT_MAX_SCALE_CAP,
        }
    }
}

/// One device-input callback, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GestureEvent {
    Start,
    /// Cumulative pinch factor since gesture start, with an optional focal
    /// point in container coordinates.
    Scale {
        factor: f64,
        #[serde(default)]
        focal: Option<Point>,
    },
    /// Cumulative pan translation since gesture start.
    Pan { dx: f64, dy: f64 },
    End,
}

/// Parse a recorded gesture stream (a JSON array of events).
pub fn parse_gesture_stream(json: &str) -> Result<Vec<GestureEvent>, serde_json::Error> {
    serde_json::from_str(json)
}

#[derive(Debug, Clone, Copy)]
struct ActiveGesture {
    factor: f64,
    focal: Option<Point>,
    pan: Vector,
}

impl ActiveGesture {
    fn new() -> Self {
        Self {
            factor: 1.0,
            focal: None,
            pan: Vector::default(),
        }
    }
}

/// Session-scoped gesture state for one displayed photo.
#[derive(Debug, Clone)]
pub struct ViewportState {
    displayed_width: f64,
    displayed_height: f64,
    frame_size: f64,
    image_center: Point,
    min_scale: f64,
    max_scale: f64,
    current: ViewportTransform,
    saved: ViewportTransform,
    active: Option<ActiveGesture>,
}

impl ViewportState {
    pub fn new(layout: &DisplayedLayout, frame: CropFrame, limits: ViewportLimits) -> Self {
        let max_scale = limits.max_scale_cap.max(frame.size / layout.min_side());
        Self {
            displayed_width: layout.displayed_width,
            displayed_height: layout.displayed_height,
            frame_size: frame.size,
            image_center: layout.center(),
            min_scale: limits.min_scale,
            max_scale,
            current: ViewportTransform::IDENTITY,
            saved: ViewportTransform::IDENTITY,
            active: None,
        }
    }

    pub fn current(&self) -> ViewportTransform {
        self.current
    }

    pub fn min_scale(&self) -> f64 {
        self.min_scale
    }

    pub fn max_scale(&self) -> f64 {
        self.max_scale
    }

    pub fn is_gesture_active(&self) -> bool {
        self.active.is_some()
    }

    /// Back to identity, dropping any running gesture.
    pub fn reset(&mut self) {
        self.current = ViewportTransform::IDENTITY;
        self.saved = ViewportTransform::IDENTITY;
        self.active = None;
    }

    /// Snapshot the current transform as the baseline for a new gesture.
    pub fn gesture_start(&mut self) {
        self.saved = self.current;
        self.active = Some(ActiveGesture::new());
    }

    pub fn scale_update(&mut self, factor: f64, focal: Option<Point>) {
        if !factor.is_finite() || factor <= 0.0 {
            tracing::debug!(factor, "ignoring invalid pinch factor");
            return;
        }
        let gesture = self.ensure_active();
        gesture.factor = factor;
        if focal.is_some() {
            gesture.focal = focal;
        }
        self.recompute();
    }

    pub fn pan_update(&mut self, delta: Vector) {
        if !delta.dx.is_finite() || !delta.dy.is_finite() {
            tracing::debug!(?delta, "ignoring invalid pan delta");
            return;
        }
        self.ensure_active().pan = delta;
        self.recompute();
    }

    /// Commit the running gesture as the new baseline.
    pub fn gesture_end(&mut self) {
        self.saved = self.current;
        self.active = None;
        tracing::debug!(transform = ?self.current, "gesture committed");
    }

    pub fn apply(&mut self, event: &GestureEvent) {
        match *event {
            GestureEvent::Start => self.gesture_start(),
            GestureEvent::Scale { factor, focal } => self.scale_update(factor, focal),
            GestureEvent::Pan { dx, dy } => self.pan_update(Vector::new(dx, dy)),
            GestureEvent::End => self.gesture_end(),
        }
    }

    pub fn clamp_scale(&self, scale: f64) -> f64 {
        // f64::clamp panics when min > max
        scale.max(self.min_scale).min(self.max_scale)
    }

    /// Largest pan per axis that keeps the scaled photo covering the crop frame.
    pub fn max_translate(&self, scale: f64) -> Vector {
        Vector::new(
            ((self.displayed_width * scale - self.frame_size) / 2.0).max(0.0),
            ((self.displayed_height * scale - self.frame_size) / 2.0).max(0.0),
        )
    }

    /// Clamp a raw translation for the given scale. Idempotent.
    pub fn clamp_translation(&self, raw: Vector, scale: f64) -> Vector {
        let bound = self.max_translate(scale);
        Vector::new(
            raw.dx.max(-bound.dx).min(bound.dx),
            raw.dy.max(-bound.dy).min(bound.dy),
        )
    }

    fn ensure_active(&mut self) -> &mut ActiveGesture {
        if self.active.is_none() {
            self.saved = self.current;
        }
        self.active.get_or_insert_with(ActiveGesture::new)
    }

    fn recompute(&mut self) {
        let Some(gesture) = self.active else {
            return;
        };
        let saved = self.saved;

        let scale = self.clamp_scale(saved.scale * gesture.factor);
        let k = scale / saved.scale;

        // Keep the photo point under the focal point fixed while zooming
        let (base_x, base_y) = match gesture.focal {
            Some(focal) => (
                (focal.x - self.image_center.x) * (1.0 - k) + saved.translate_x * k,
                (focal.y - self.image_center.y) * (1.0 - k) + saved.translate_y * k,
            ),
            None => (saved.translate_x, saved.translate_y),
        };

        let t = self.clamp_translation(
            Vector::new(base_x + gesture.pan.dx, base_y + gesture.pan.dy),
            scale,
        );

        self.current = ViewportTransform {
            scale,
            translate_x: t.dx,
            translate_y: t.dy,
        };
    }
}

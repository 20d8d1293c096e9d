//! Maps the on-screen crop frame back onto original image pixels.

use crate::layout::{CropFrame, DisplayedLayout};
use crate::types::{ContainerSize, ImageSize, PixelRect};
use crate::viewport::ViewportTransform;
use serde::{Deserialize, Serialize};

/// Square crop in original image pixel space, fully inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
    /// The frame selected more than the shorter image side and was shrunk to
    /// fit. Reachable with the default limits whenever the user zooms out
    /// below the scale at which the frame spans the shorter displayed side.
    pub size_clamped: bool,
}

impl CropRegion {
    /// Round to whole pixels, staying square and inside `image`.
    pub fn to_pixel_rect(&self, image: ImageSize) -> PixelRect {
        let max_side = image.width.min(image.height).max(1);
        let side = (self.width.round().max(1.0) as u32).min(max_side);
        let x = (self.origin_x.round().max(0.0) as u32).min(image.width.saturating_sub(side));
        let y = (self.origin_y.round().max(0.0) as u32).min(image.height.saturating_sub(side));
        PixelRect {
            x,
            y,
            width: side,
            height: side,
        }
    }
}

/// Resolve the crop frame under the current zoom/pan into original pixels.
///
/// The frame is concentric with the container, not the photo. Scaling is
/// anchored at the photo centre, then shifted by the pan.
pub fn resolve_crop_region(
    original: ImageSize,
    container: ContainerSize,
    layout: &DisplayedLayout,
    transform: &ViewportTransform,
    frame: CropFrame,
) -> CropRegion {
    let image_w = original.width as f64;
    let image_h = original.height as f64;
    let scale = transform.scale;

    let image_display_scale = layout.image_display_scale(original);
    let frame_center = container.center();

    let scaled_w = layout.displayed_width * scale;
    let scaled_h = layout.displayed_height * scale;
    let image_left = layout.offset_x + (layout.displayed_width - scaled_w) / 2.0 + transform.translate_x;
    let image_top = layout.offset_y + (layout.displayed_height - scaled_h) / 2.0 + transform.translate_y;

    // Frame centre on the unscaled displayed photo, then in original pixels
    let center_on_image_x = (frame_center.x - image_left) / scale;
    let center_on_image_y = (frame_center.y - image_top) / scale;
    let center_x = center_on_image_x / image_display_scale;
    let center_y = center_on_image_y / image_display_scale;

    let requested_size = (frame.size / scale) / image_display_scale;
    let shorter_side = image_w.min(image_h);
    let size_clamped = requested_size > shorter_side;
    let crop_size = if size_clamped {
        tracing::debug!(
            requested_size,
            shorter_side,
            scale,
            "crop frame exceeds image; shrinking to shorter side"
        );
        shorter_side
    } else {
        requested_size
    };

    let origin_x = (center_x - crop_size / 2.0).min(image_w - crop_size).max(0.0);
    let origin_y = (center_y - crop_size / 2.0).min(image_h - crop_size).max(0.0);

    // Guard against float drift pushing the far edge past the image
    let side = crop_size.min(image_w - origin_x).min(image_h - origin_y);

    tracing::debug!(
        image_display_scale,
        scale,
        translate_x = transform.translate_x,
        translate_y = transform.translate_y,
        image_left,
        image_top,
        center_x,
        center_y,
        crop_size,
        origin_x,
        origin_y,
        "resolved crop region"
    );

    CropRegion {
        origin_x,
        origin_y,
        width: side,
        height: side,
        size_clamped,
    }
}

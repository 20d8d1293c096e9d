//! Contain-fit layout of a photo inside its display container, and the fixed
//! square crop frame drawn over it.

use crate::types::{ContainerSize, ImageSize, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest share of the container height the crop frame may occupy.
const CROP_FRAME_MAX_HEIGHT_FRACTION: f64 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
}

/// How the photo is rendered inside the container under contain fitting.
///
/// Exactly one of `offset_x` / `offset_y` is zero: the photo touches the
/// container edge to edge on its constraining axis and is centred on the
/// other one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayedLayout {
    pub displayed_width: f64,
    pub displayed_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl DisplayedLayout {
    /// On-screen pixels per original pixel at 1x zoom.
    pub fn image_display_scale(&self, original: ImageSize) -> f64 {
        self.displayed_width / original.width as f64
    }

    /// Centre of the displayed photo in container coordinates.
    pub fn center(&self) -> Point {
        Point::new(
            self.offset_x + self.displayed_width / 2.0,
            self.offset_y + self.displayed_height / 2.0,
        )
    }

    /// Shorter displayed side.
    pub fn min_side(&self) -> f64 {
        self.displayed_width.min(self.displayed_height)
    }
}

/// Compute the contain-fit layout of `original` inside `container`.
///
/// Must be re-run whenever the container changes size; a stale layout
/// silently produces wrong crops.
pub fn resolve_layout(
    original: ImageSize,
    container: ContainerSize,
) -> Result<DisplayedLayout, GeometryError> {
    if original.width == 0 || original.height == 0 {
        return Err(GeometryError::InvalidDimensions(format!(
            "image {}x{}",
            original.width, original.height
        )));
    }
    if !container.is_valid() {
        return Err(GeometryError::InvalidDimensions(format!(
            "container {}x{}",
            container.width, container.height
        )));
    }

    let container_aspect = container.width / container.height;
    let image_aspect = original.aspect();

    let layout = if image_aspect > container_aspect {
        // Relatively wider: constrained by container width
        let displayed_height = container.width / image_aspect;
        DisplayedLayout {
            displayed_width: container.width,
            displayed_height,
            offset_x: 0.0,
            offset_y: (container.height - displayed_height) / 2.0,
        }
    } else {
        let displayed_width = container.height * image_aspect;
        DisplayedLayout {
            displayed_width,
            displayed_height: container.height,
            offset_x: (container.width - displayed_width) / 2.0,
            offset_y: 0.0,
        }
    };

    tracing::debug!(
        image_w = original.width,
        image_h = original.height,
        container_w = container.width,
        container_h = container.height,
        ?layout,
        "resolved contain layout"
    );

    Ok(layout)
}

/// Fixed square crop region, concentric with the container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropFrame {
    pub size: f64,
}

impl CropFrame {
    pub fn new(size: f64) -> Result<Self, GeometryError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(GeometryError::InvalidDimensions(format!("crop frame {size}")));
        }
        Ok(Self { size })
    }

    /// Largest frame that leaves `padding` on each horizontal side and takes
    /// at most half the container height.
    pub fn fit(container: ContainerSize, padding: f64) -> Result<Self, GeometryError> {
        if !container.is_valid() {
            return Err(GeometryError::InvalidDimensions(format!(
                "container {}x{}",
                container.width, container.height
            )));
        }
        let size = (container.width - 2.0 * padding)
            .min(container.height * CROP_FRAME_MAX_HEIGHT_FRACTION);
        Self::new(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_height_constrained_layout() {
        // 3000x4000 portrait in a 400x300 landscape container
        let layout =
            resolve_layout(ImageSize::new(3000, 4000), ContainerSize::new(400.0, 300.0)).unwrap();
        assert!((layout.displayed_height - 300.0).abs() < EPS);
        assert!((layout.displayed_width - 225.0).abs() < EPS);
        assert!((layout.offset_x - 87.5).abs() < EPS);
        assert_eq!(layout.offset_y, 0.0);
    }

    #[test]
    fn test_width_constrained_layout() {
        let layout =
            resolve_layout(ImageSize::new(4000, 2000), ContainerSize::new(400.0, 300.0)).unwrap();
        assert!((layout.displayed_width - 400.0).abs() < EPS);
        assert!((layout.displayed_height - 200.0).abs() < EPS);
        assert_eq!(layout.offset_x, 0.0);
        assert!((layout.offset_y - 50.0).abs() < EPS);
    }

    #[test]
    fn test_equal_aspect_fills_container() {
        let layout =
            resolve_layout(ImageSize::new(800, 600), ContainerSize::new(400.0, 300.0)).unwrap();
        assert!((layout.displayed_width - 400.0).abs() < EPS);
        assert!((layout.displayed_height - 300.0).abs() < EPS);
        assert!(layout.offset_x.abs() < EPS);
        assert_eq!(layout.offset_y, 0.0);
    }

    #[test]
    fn test_layout_containment() {
        let images = [(1, 1), (3000, 4000), (4000, 3000), (1920, 1080), (7, 1000), (1000, 7)];
        let containers = [(400.0, 300.0), (300.0, 400.0), (375.0, 812.0), (1.5, 2.5), (1000.0, 1.0)];

        for &(iw, ih) in &images {
            for &(cw, ch) in &containers {
                let container = ContainerSize::new(cw, ch);
                let layout = resolve_layout(ImageSize::new(iw, ih), container).unwrap();
                let tol = 1e-9 * cw.max(ch);

                assert!(layout.displayed_width <= cw + tol, "{iw}x{ih} in {cw}x{ch}");
                assert!(layout.displayed_height <= ch + tol, "{iw}x{ih} in {cw}x{ch}");
                let touches = (layout.displayed_width - cw).abs() <= tol
                    || (layout.displayed_height - ch).abs() <= tol;
                assert!(touches, "{iw}x{ih} in {cw}x{ch} touches neither edge");
                assert!(layout.offset_x == 0.0 || layout.offset_y == 0.0);
                assert!(layout.offset_x >= -tol && layout.offset_y >= -tol);

                // Displayed photo is centred in the container
                let c = layout.center();
                assert!((c.x - cw / 2.0).abs() <= tol);
                assert!((c.y - ch / 2.0).abs() <= tol);
            }
        }
    }

    #[test]
    fn test_invalid_dimensions() {
        let ok_container = ContainerSize::new(400.0, 300.0);
        assert!(resolve_layout(ImageSize::new(0, 100), ok_container).is_err());
        assert!(resolve_layout(ImageSize::new(100, 0), ok_container).is_err());
        let image = ImageSize::new(100, 100);
        assert!(resolve_layout(image, ContainerSize::new(0.0, 300.0)).is_err());
        assert!(resolve_layout(image, ContainerSize::new(400.0, 0.0)).is_err());
        assert!(resolve_layout(image, ContainerSize::new(-400.0, 300.0)).is_err());
    }

    #[test]
    fn test_image_display_scale() {
        let original = ImageSize::new(3000, 4000);
        let layout = resolve_layout(original, ContainerSize::new(400.0, 300.0)).unwrap();
        assert!((layout.image_display_scale(original) - 0.075).abs() < EPS);
    }

    #[test]
    fn test_crop_frame_fit() {
        // Phone portrait: width-limited
        let frame = CropFrame::fit(ContainerSize::new(390.0, 844.0), 20.0).unwrap();
        assert!((frame.size - 350.0).abs() < EPS);

        // Landscape: half the height wins
        let frame = CropFrame::fit(ContainerSize::new(400.0, 300.0), 20.0).unwrap();
        assert!((frame.size - 150.0).abs() < EPS);
    }

    #[test]
    fn test_crop_frame_rejects_non_positive() {
        assert!(CropFrame::new(0.0).is_err());
        assert!(CropFrame::new(-5.0).is_err());
        assert!(CropFrame::new(f64::NAN).is_err());
        assert!(CropFrame::fit(ContainerSize::new(30.0, 300.0), 20.0).is_err());
    }
}

//! One interactive crop session: the displayed photo, its layout, the crop
//! frame and the gesture state, owned together and reset together.

use crate::crop::{resolve_crop_region, CropRegion};
use crate::layout::{resolve_layout, CropFrame, DisplayedLayout, GeometryError};
use crate::types::{ContainerSize, OriginalImage, Point, Vector};
use crate::viewport::{GestureEvent, ViewportLimits, ViewportState, ViewportTransform};

/// How the crop frame is sized for a container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameSizing {
    /// Recomputed from the container with this horizontal padding.
    Padding(f64),
    /// Fixed side length in container pixels.
    Fixed(f64),
}

impl FrameSizing {
    fn frame_for(&self, container: ContainerSize) -> Result<CropFrame, GeometryError> {
        match *self {
            FrameSizing::Padding(padding) => CropFrame::fit(container, padding),
            FrameSizing::Fixed(size) => CropFrame::new(size),
        }
    }
}

pub struct CropSession {
    original: OriginalImage,
    container: ContainerSize,
    sizing: FrameSizing,
    limits: ViewportLimits,
    layout: DisplayedLayout,
    frame: CropFrame,
    viewport: ViewportState,
}

impl CropSession {
    pub fn new(
        original: OriginalImage,
        container: ContainerSize,
        sizing: FrameSizing,
        limits: ViewportLimits,
    ) -> Result<Self, GeometryError> {
        let layout = resolve_layout(original.size, container)?;
        let frame = sizing.frame_for(container)?;
        let viewport = ViewportState::new(&layout, frame, limits);

        tracing::info!(
            uri = %original.uri.display(),
            width = original.size.width,
            height = original.size.height,
            frame = frame.size,
            max_scale = viewport.max_scale(),
            "crop session started"
        );

        Ok(Self {
            original,
            container,
            sizing,
            limits,
            layout,
            frame,
            viewport,
        })
    }

    pub fn original(&self) -> &OriginalImage {
        &self.original
    }

    pub fn container(&self) -> ContainerSize {
        self.container
    }

    pub fn layout(&self) -> &DisplayedLayout {
        &self.layout
    }

    pub fn frame(&self) -> CropFrame {
        self.frame
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn transform(&self) -> ViewportTransform {
        self.viewport.current()
    }

    /// Swap in a new photo. Layout is recomputed and the zoom/pan reset.
    pub fn load_image(&mut self, original: OriginalImage) -> Result<(), GeometryError> {
        let layout = resolve_layout(original.size, self.container)?;
        self.original = original;
        self.rebuild(layout, self.frame);
        tracing::info!(uri = %self.original.uri.display(), "image replaced; viewport reset");
        Ok(())
    }

    /// Container changed size (rotation). Everything derived is recomputed.
    pub fn set_container(&mut self, container: ContainerSize) -> Result<(), GeometryError> {
        let layout = resolve_layout(self.original.size, container)?;
        let frame = self.sizing.frame_for(container)?;
        self.container = container;
        self.rebuild(layout, frame);
        tracing::info!(
            width = container.width,
            height = container.height,
            frame = frame.size,
            "container resized; viewport reset"
        );
        Ok(())
    }

    pub fn gesture_start(&mut self) {
        self.viewport.gesture_start();
    }

    pub fn scale_update(&mut self, factor: f64, focal: Option<Point>) {
        self.viewport.scale_update(factor, focal);
    }

    pub fn pan_update(&mut self, delta: Vector) {
        self.viewport.pan_update(delta);
    }

    pub fn gesture_end(&mut self) {
        self.viewport.gesture_end();
    }

    pub fn apply(&mut self, event: &GestureEvent) {
        self.viewport.apply(event);
    }

    /// Crop region for the transform as it stands right now.
    pub fn crop_region(&self) -> CropRegion {
        resolve_crop_region(
            self.original.size,
            self.container,
            &self.layout,
            &self.viewport.current(),
            self.frame,
        )
    }

    fn rebuild(&mut self, layout: DisplayedLayout, frame: CropFrame) {
        self.layout = layout;
        self.frame = frame;
        self.viewport = ViewportState::new(&layout, frame, self.limits);
    }
}

//! passcrop-core: Interactive crop geometry and passport head-size checks.
//!
//! Maps a pinch-zoomed, panned photo inside a fixed square crop frame back to
//! exact pixels on the full-resolution original, and measures head height on
//! the final photo using SCRFD face detection via ONNX Runtime.

pub mod crop;
pub mod detector;
pub mod head_size;
pub mod layout;
pub mod provider;
pub mod session;
pub mod types;
pub mod viewport;

pub use crop::{resolve_crop_region, CropRegion};
pub use head_size::{evaluate_faces, HeadSizeBand, HeadSizeOutcome, HeadSizeVerdict, PASSPORT_DPI};
pub use layout::{resolve_layout, CropFrame, DisplayedLayout, GeometryError};
pub use provider::{
    default_model_dir, select_detector, BuildProfile, DetectorBackend, DetectorError, FaceDetector,
    MockFaceDetector, MockFaceSettings,
};
pub use session::{CropSession, FrameSizing};
pub use types::{
    ContainerSize, FaceBounds, FaceDetection, ImageSize, OriginalImage, PixelRect, Point, Vector,
};
pub use viewport::{parse_gesture_stream, GestureEvent, ViewportLimits, ViewportState, ViewportTransform};

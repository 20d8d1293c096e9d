//! passcrop-imaging: Image-processing capability for the crop pipeline.
//!
//! Loads camera and library photos with their EXIF orientation applied, and
//! crops and resizes them into JPEG files in a work directory.

pub mod processor;

pub use processor::{
    decode_oriented, load_original, FileImageProcessor, ImageProcessor, ProcessError, ProcessedImage,
};

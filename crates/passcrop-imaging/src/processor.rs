//! Crop and resize photos on disk, writing JPEG results into a work directory.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageReader, RgbImage};
use passcrop_core::{ImageSize, OriginalImage, PixelRect};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("crop {rect:?} is outside the {width}x{height} image")]
    OutOfBounds { rect: PixelRect, width: u32, height: u32 },
    #[error("quality must be between 0.0 and 1.0, got {0}")]
    InvalidQuality(f32),
    #[error("target size must be > 0, got {0}x{1}")]
    InvalidSize(u32, u32),
    #[error("failed to encode: {0}")]
    Encode(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// An image written by the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// The image-processing capability consumed by the crop executor.
///
/// Implementations never modify `source`.
pub trait ImageProcessor: Send + Sync {
    fn crop(&self, source: &Path, rect: PixelRect, quality: f32) -> Result<ProcessedImage, ProcessError>;

    fn resize(
        &self,
        source: &Path,
        width: u32,
        height: u32,
        quality: f32,
    ) -> Result<ProcessedImage, ProcessError>;
}

/// Decode a photo with its EXIF orientation applied, so pixel dimensions
/// match what the user sees on screen.
pub fn decode_oriented(path: &Path) -> Result<DynamicImage, ProcessError> {
    let decode_err = |reason: String| ProcessError::Decode {
        path: path.display().to_string(),
        reason,
    };

    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let mut decoder = reader.into_decoder().map_err(|e| decode_err(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).map_err(|e| decode_err(e.to_string()))?;
    image.apply_orientation(orientation);

    if image.width() == 0 || image.height() == 0 {
        return Err(decode_err("image dimensions are zero".into()));
    }
    Ok(image)
}

/// Open a camera or library photo as an [`OriginalImage`].
pub fn load_original(path: &Path) -> Result<OriginalImage, ProcessError> {
    let image = decode_oriented(path)?;
    let original = OriginalImage {
        uri: path.to_path_buf(),
        size: ImageSize::new(image.width(), image.height()),
    };
    tracing::info!(
        path = %path.display(),
        width = original.size.width,
        height = original.size.height,
        "original image loaded"
    );
    Ok(original)
}

/// Composite any alpha channel onto white (passport background).
pub fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image::Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

fn check_quality(quality: f32) -> Result<u8, ProcessError> {
    if !(0.0..=1.0).contains(&quality) {
        return Err(ProcessError::InvalidQuality(quality));
    }
    Ok(((quality * 100.0).round() as u8).max(1))
}

/// File-backed processor. Every output gets a fresh name in `work_dir`.
pub struct FileImageProcessor {
    work_dir: PathBuf,
}

impl FileImageProcessor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self, ProcessError> {
        let work_dir = work_dir.into();
        std::fs::create_dir_all(&work_dir)?;
        Ok(Self { work_dir })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Encode to a temporary name, then rename, so a failed write never
    /// leaves a half-written JPEG behind.
    fn write_jpeg(&self, image: &DynamicImage, quality: u8) -> Result<ProcessedImage, ProcessError> {
        let rgb = flatten_alpha(image);
        let id = uuid::Uuid::new_v4();
        let path = self.work_dir.join(format!("{id}.jpg"));
        let partial = self.work_dir.join(format!("{id}.jpg.part"));

        let written = (|| {
            let mut writer = BufWriter::new(File::create(&partial)?);
            JpegEncoder::new_with_quality(&mut writer, quality)
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
                .map_err(|e| ProcessError::Encode(e.to_string()))?;
            writer.flush()?;
            drop(writer);
            std::fs::rename(&partial, &path)?;
            Ok::<_, ProcessError>(())
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }

        Ok(ProcessedImage {
            path,
            width: rgb.width(),
            height: rgb.height(),
        })
    }
}

impl ImageProcessor for FileImageProcessor {
    fn crop(&self, source: &Path, rect: PixelRect, quality: f32) -> Result<ProcessedImage, ProcessError> {
        let quality = check_quality(quality)?;
        let image = decode_oriented(source)?;
        let size = ImageSize::new(image.width(), image.height());
        if !rect.fits_within(size) {
            return Err(ProcessError::OutOfBounds {
                rect,
                width: size.width,
                height: size.height,
            });
        }

        let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        let out = self.write_jpeg(&cropped, quality)?;
        tracing::debug!(source = %source.display(), ?rect, out = %out.path.display(), "cropped");
        Ok(out)
    }

    fn resize(
        &self,
        source: &Path,
        width: u32,
        height: u32,
        quality: f32,
    ) -> Result<ProcessedImage, ProcessError> {
        if width == 0 || height == 0 {
            return Err(ProcessError::InvalidSize(width, height));
        }
        let quality = check_quality(quality)?;
        let image = decode_oriented(source)?;

        let resized = image.resize_exact(width, height, FilterType::Lanczos3);
        let out = self.write_jpeg(&resized, quality)?;
        tracing::debug!(source = %source.display(), width, height, out = %out.path.display(), "resized");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;

    fn write_gradient_png(dir: &Path, width: u32, height: u32) -> PathBuf {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
        });
        let path = dir.join(format!("gradient_{width}x{height}.png"));
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        std::fs::write(&path, buffer).unwrap();
        path
    }

    fn is_jpeg(path: &Path) -> bool {
        let bytes = std::fs::read(path).unwrap();
        bytes.len() > 2 && bytes[0] == 0xFF && bytes[1] == 0xD8
    }

    #[test]
    fn test_load_original_reports_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gradient_png(dir.path(), 300, 400);
        let original = load_original(&path).unwrap();
        assert_eq!(original.size, ImageSize::new(300, 400));
        assert_eq!(original.uri, path);
    }

    /// Landscape JPEG tagged EXIF Orientation=6 (rotate 90° clockwise to display).
    fn write_rotated_jpeg(dir: &Path, width: u32, height: u32) -> PathBuf {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 { image::Rgb([255, 0, 0]) } else { image::Rgb([0, 0, 255]) }
        });
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 95)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();

        // Little-endian TIFF with one IFD entry: tag 0x0112, SHORT, count 1, value 6
        let tiff: [u8; 26] = [
            0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, // header, IFD at 8
            0x01, 0x00, // one entry
            0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, // no next IFD
        ];
        let mut app1 = vec![0xFF, 0xE1];
        app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(&tiff);

        let mut bytes = jpeg[..2].to_vec();
        bytes.extend_from_slice(&app1);
        bytes.extend_from_slice(&jpeg[2..]);

        let path = dir.join("rotated.jpg");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_exif_orientation_swaps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rotated_jpeg(dir.path(), 40, 20);

        let original = load_original(&path).unwrap();
        assert_eq!(original.size, ImageSize::new(20, 40));

        // Valid only in the displayed (portrait) orientation
        let processor = FileImageProcessor::new(dir.path().join("work")).unwrap();
        let rect = PixelRect { x: 0, y: 20, width: 20, height: 20 };
        let out = processor.crop(&path, rect, 1.0).unwrap();
        assert_eq!((out.width, out.height), (20, 20));
    }

    #[test]
    fn test_load_original_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_image.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(load_original(&path), Err(ProcessError::Decode { .. })));
    }

    #[test]
    fn test_crop_writes_jpeg_of_rect_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_gradient_png(dir.path(), 300, 400);
        let processor = FileImageProcessor::new(dir.path().join("work")).unwrap();

        let rect = PixelRect { x: 20, y: 50, width: 250, height: 250 };
        let out = processor.crop(&source, rect, 1.0).unwrap();
        assert_eq!((out.width, out.height), (250, 250));
        assert!(out.path.starts_with(processor.work_dir()));
        assert!(is_jpeg(&out.path));

        let decoded = image::open(&out.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (250, 250));
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_gradient_png(dir.path(), 100, 100);
        let processor = FileImageProcessor::new(dir.path().join("work")).unwrap();

        let rect = PixelRect { x: 50, y: 0, width: 60, height: 60 };
        let result = processor.crop(&source, rect, 1.0);
        assert!(matches!(result, Err(ProcessError::OutOfBounds { .. })));
        // Nothing written on failure
        assert_eq!(std::fs::read_dir(processor.work_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_resize_exact() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_gradient_png(dir.path(), 250, 250);
        let processor = FileImageProcessor::new(dir.path().join("work")).unwrap();

        let out = processor.resize(&source, 600, 600, 0.9).unwrap();
        assert_eq!((out.width, out.height), (600, 600));
        assert!(is_jpeg(&out.path));
    }

    #[test]
    fn test_invalid_quality_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_gradient_png(dir.path(), 50, 50);
        let processor = FileImageProcessor::new(dir.path().join("work")).unwrap();
        let rect = PixelRect { x: 0, y: 0, width: 10, height: 10 };

        assert!(matches!(processor.crop(&source, rect, 1.5), Err(ProcessError::InvalidQuality(_))));
        assert!(matches!(processor.crop(&source, rect, -0.1), Err(ProcessError::InvalidQuality(_))));
        assert!(matches!(processor.resize(&source, 0, 600, 0.9), Err(ProcessError::InvalidSize(0, 600))));
    }

    #[test]
    fn test_source_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_gradient_png(dir.path(), 120, 90);
        let before = std::fs::read(&source).unwrap();
        let processor = FileImageProcessor::new(dir.path().join("work")).unwrap();

        processor.crop(&source, PixelRect { x: 10, y: 0, width: 90, height: 90 }, 1.0).unwrap();
        assert_eq!(std::fs::read(&source).unwrap(), before);
    }

    #[test]
    fn test_flatten_alpha_over_white() {
        let mut rgba = image::RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, image::Rgba([255, 0, 0, 0]));
        rgba.put_pixel(1, 0, image::Rgba([100, 150, 200, 255]));
        let rgb = flatten_alpha(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &image::Rgb([100, 150, 200]));
    }
}

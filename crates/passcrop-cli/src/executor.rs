use passcrop_core::{CropRegion, OriginalImage, PixelRect};
use passcrop_imaging::{ImageProcessor, ProcessError, ProcessedImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("a crop is already in progress")]
    Busy,
    #[error("crop failed: {0}")]
    CropFailed(String),
}

/// The final passport photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedPhoto {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Pixels taken from the original.
    pub source_rect: PixelRect,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub crop_quality: f32,
    pub resize_quality: f32,
    pub timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            crop_quality: 1.0,
            resize_quality: 0.9,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Held while a crop runs; clears the flag on drop.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs the confirmed crop: crop the original, then resize to the final
/// square. One execution at a time.
pub struct CropExecutor<P> {
    processor: Arc<P>,
    settings: ExecutorSettings,
    in_flight: Arc<AtomicBool>,
}

impl<P: ImageProcessor + 'static> CropExecutor<P> {
    pub fn new(processor: P, settings: ExecutorSettings) -> Self {
        Self {
            processor: Arc::new(processor),
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Crop `original` to `region`, then resize to `output_size` square.
    ///
    /// Returns `Busy` at once if another execution is still running. On any
    /// failure nothing is left in the work directory and the original is
    /// untouched.
    pub async fn execute(
        &self,
        original: &OriginalImage,
        region: &CropRegion,
        output_size: u32,
    ) -> Result<ProcessedPhoto, ExecutorError> {
        let guard = InFlight::try_acquire(&self.in_flight).ok_or(ExecutorError::Busy)?;

        if output_size == 0 {
            return Err(ExecutorError::CropFailed("output size must be > 0".into()));
        }
        if region.size_clamped {
            tracing::debug!(?region, "executing a crop that was shrunk to fit the image");
        }

        let rect = region.to_pixel_rect(original.size);
        let source = original.uri.clone();
        let processor = Arc::clone(&self.processor);
        let settings = self.settings;
        let (reply_tx, mut reply_rx) = oneshot::channel();

        tracing::info!(
            source = %source.display(),
            ?rect,
            output_size,
            "crop started"
        );

        tokio::task::spawn_blocking(move || {
            // The guard lives as long as the work, even past a timeout.
            let _guard = guard;
            let result = crop_and_resize(processor.as_ref(), &source, rect, output_size, &settings);
            // Receiver gone: the caller already gave up, so nobody owns the output.
            if let Err(Ok(late)) = reply_tx.send(result) {
                discard(&late.path);
            }
        });

        let waited = tokio::time::timeout(self.settings.timeout, &mut reply_rx).await;
        let outcome = match waited {
            Err(_) => {
                reply_rx.close();
                // Sent between the deadline and close(): clean up here instead.
                if let Ok(Ok(late)) = reply_rx.try_recv() {
                    discard(&late.path);
                }
                Err(ExecutorError::CropFailed(format!(
                    "timed out after {}s",
                    self.settings.timeout.as_secs_f32()
                )))
            }
            Ok(Err(_)) => Err(ExecutorError::CropFailed("crop task aborted".into())),
            Ok(Ok(result)) => result.map_err(|e| ExecutorError::CropFailed(e.to_string())),
        };

        match outcome {
            Ok(image) => {
                tracing::info!(path = %image.path.display(), width = image.width, "crop finished");
                Ok(ProcessedPhoto {
                    path: image.path,
                    width: image.width,
                    height: image.height,
                    source_rect: rect,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "crop failed; original left untouched");
                Err(e)
            }
        }
    }
}

/// Both steps on the calling thread. The intermediate is always removed.
fn crop_and_resize<P: ImageProcessor + ?Sized>(
    processor: &P,
    source: &Path,
    rect: PixelRect,
    output_size: u32,
    settings: &ExecutorSettings,
) -> Result<ProcessedImage, ProcessError> {
    let intermediate = processor.crop(source, rect, settings.crop_quality)?;
    tracing::debug!(path = %intermediate.path.display(), "intermediate written");

    let resized = processor.resize(
        &intermediate.path,
        output_size,
        output_size,
        settings.resize_quality,
    );
    discard(&intermediate.path);
    resized
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary photo");
    }
}

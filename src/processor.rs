//! Unified removal pipeline
//!
//! One pipeline drives both request paths: the synchronous handler streams
//! the outcome inline, the worker persists it via the registry. Keeping a
//! single implementation avoids drift between the two entry points.

use crate::config::ServerConfig;
use crate::enhancement;
use crate::error::{CutoutError, Result};
use crate::gate::InferenceGate;
use crate::inference::SegmentationBackend;
use crate::preprocessing;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Shared preprocess -> gated inference -> enhancement pipeline
pub struct RemovalPipeline {
    gate: InferenceGate,
    max_dimension: u32,
}

impl RemovalPipeline {
    /// Build the pipeline around a segmentation backend
    #[must_use]
    pub fn new(backend: Box<dyn SegmentationBackend>, config: &ServerConfig) -> Self {
        Self {
            gate: InferenceGate::new(backend),
            max_dimension: config.max_dimension,
        }
    }

    /// Process one raster through the full pipeline
    ///
    /// Downscales to the configured bound, runs the gated inference call,
    /// then optionally applies cosmetic enhancement (which preserves the
    /// alpha matte and never fails the job).
    ///
    /// # Errors
    /// - Inference engine initialization or inference failures
    pub async fn process(&self, image: DynamicImage, enhance: bool) -> Result<RgbaImage> {
        let bounded = preprocessing::downscale_to_bound(&image, self.max_dimension);
        debug!(
            width = bounded.width(),
            height = bounded.height(),
            enhance,
            "processing raster"
        );

        let mut result = self.gate.remove_background(bounded).await?;
        if enhance {
            result = enhancement::enhance(&result);
        }
        Ok(result)
    }
}

/// Encode an RGBA raster as PNG bytes
///
/// Re-encoding writes a bare PNG: embedded color profiles and EXIF metadata
/// never survive into results.
///
/// # Errors
/// Returns an image error when encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| CutoutError::processing(format!("Failed to encode PNG: {e}")))?;
    Ok(bytes)
}

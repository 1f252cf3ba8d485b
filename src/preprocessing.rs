//! Raster preprocessing ahead of inference
//!
//! Bounds the cost of a single job by capping the pixel count before the
//! image enters the pipeline. Deterministic for identical input and bound.

use image::DynamicImage;

/// Downscale a raster so its larger dimension does not exceed `max_dimension`
///
/// Preserves aspect ratio (within one pixel of rounding) using a Lanczos3
/// resampling filter. Rasters already within the bound pass through
/// unchanged; this function never upscales.
#[must_use]
pub fn downscale_to_bound(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let larger = width.max(height);
    if larger <= max_dimension {
        return image.clone();
    }

    let scale = f64::from(max_dimension) / f64::from(larger);
    let new_width = ((f64::from(width) * scale).round() as u32).max(1);
    let new_height = ((f64::from(height) * scale).round() as u32).max(1);

    image.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

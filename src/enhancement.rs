//! Cosmetic enhancement of segmented rasters
//!
//! The pipeline operates on the RGB channels only: the alpha matte is split
//! off before processing and re-attached byte-identical afterwards. The
//! primary chain (smoothing, detail blend, saturation, brightness/contrast)
//! degrades to a simpler deterministic chain on any error, so enhancement
//! failure never fails the overall job.

use crate::error::{CutoutError, Result};
use image::{imageops, GrayImage, Rgb, RgbImage, RgbaImage};
use tracing::warn;

/// Primary chain parameters
const PRIMARY_SATURATION: f32 = 1.35;
const PRIMARY_BRIGHTNESS: f32 = 1.05;
const PRIMARY_CONTRAST: f32 = 1.1;
/// Weight of the smoothed base in the detail blend
const PRIMARY_BLEND_SMOOTHED: f32 = 0.4;

/// Fallback chain parameters
const FALLBACK_BRIGHTNESS: f32 = 1.2;
const FALLBACK_SATURATION: f32 = 1.4;

/// Enhance an RGBA raster, preserving its alpha channel exactly
///
/// Output has identical width, height, and alpha channel to the input; only
/// the RGB channels may differ.
#[must_use]
pub fn enhance(image: &RgbaImage) -> RgbaImage {
    enhance_with(primary_chain, image)
}

/// Enhance with an injectable primary chain
///
/// Falls back to [`fallback_chain`] when the primary chain fails. Exposed at
/// crate level so tests can exercise the fallback path with a failing primary.
pub(crate) fn enhance_with<F>(primary: F, image: &RgbaImage) -> RgbaImage
where
    F: Fn(&RgbImage) -> Result<RgbImage>,
{
    let (rgb, alpha) = split_alpha(image);

    let enhanced = match primary(&rgb) {
        Ok(enhanced) => enhanced,
        Err(err) => {
            warn!(error = %err, "primary enhancement chain failed, applying fallback");
            fallback_chain(&rgb)
        },
    };

    merge_alpha(&enhanced, &alpha)
}

/// Primary enhancement chain
///
/// Smoothed base blended 40/60 with a detail-enhanced layer, saturation
/// ×1.35 clamped to range, then brightness/contrast adjustment.
fn primary_chain(rgb: &RgbImage) -> Result<RgbImage> {
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(CutoutError::processing_stage_error(
            "enhancement",
            "empty raster",
            None,
        ));
    }

    let smoothed = imageops::blur(rgb, 2.0);
    let detail = imageops::unsharpen(rgb, 1.5, 2);
    let blended = blend(&smoothed, &detail, PRIMARY_BLEND_SMOOTHED)?;
    let saturated = adjust_saturation(&blended, PRIMARY_SATURATION);
    Ok(adjust_brightness_contrast(
        &saturated,
        PRIMARY_BRIGHTNESS,
        PRIMARY_CONTRAST,
    ))
}

/// Fallback enhancement chain: brightness ×1.2, saturation ×1.4, detail filter
fn fallback_chain(rgb: &RgbImage) -> RgbImage {
    let brightened = adjust_brightness_contrast(rgb, FALLBACK_BRIGHTNESS, 1.0);
    let saturated = adjust_saturation(&brightened, FALLBACK_SATURATION);
    imageops::unsharpen(&saturated, 1.0, 1)
}

/// Split an RGBA raster into its RGB channels and alpha matte
fn split_alpha(image: &RgbaImage) -> (RgbImage, GrayImage) {
    let (width, height) = image.dimensions();
    let mut rgb = RgbImage::new(width, height);
    let mut alpha = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        rgb.put_pixel(x, y, Rgb([pixel[0], pixel[1], pixel[2]]));
        alpha.put_pixel(x, y, image::Luma([pixel[3]]));
    }
    (rgb, alpha)
}

/// Re-attach an alpha matte to enhanced RGB channels
fn merge_alpha(rgb: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    let (width, height) = rgb.dimensions();
    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let a = alpha.get_pixel(x, y)[0];
        out.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], a]));
    }
    out
}

/// Per-channel weighted blend of two equally sized rasters
fn blend(base: &RgbImage, overlay: &RgbImage, base_weight: f32) -> Result<RgbImage> {
    if base.dimensions() != overlay.dimensions() {
        return Err(CutoutError::processing_stage_error(
            "enhancement",
            "blend dimensions differ",
            Some(&format!(
                "{}x{} vs {}x{}",
                base.width(),
                base.height(),
                overlay.width(),
                overlay.height()
            )),
        ));
    }

    let overlay_weight = 1.0 - base_weight;
    let (width, height) = base.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in base.enumerate_pixels() {
        let other = overlay.get_pixel(x, y);
        let mut blended = [0u8; 3];
        for c in 0..3 {
            let value = f32::from(pixel[c]) * base_weight + f32::from(other[c]) * overlay_weight;
            blended[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        out.put_pixel(x, y, Rgb(blended));
    }
    Ok(out)
}

/// Scale saturation around per-pixel luma, clamped to range
fn adjust_saturation(rgb: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let luma = 0.299 * f32::from(pixel[0])
            + 0.587 * f32::from(pixel[1])
            + 0.114 * f32::from(pixel[2]);
        let mut adjusted = [0u8; 3];
        for c in 0..3 {
            let value = luma + (f32::from(pixel[c]) - luma) * factor;
            adjusted[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        out.put_pixel(x, y, Rgb(adjusted));
    }
    out
}

/// Apply contrast around mid-gray, then scale brightness, clamped to range
fn adjust_brightness_contrast(rgb: &RgbImage, brightness: f32, contrast: f32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let mut adjusted = [0u8; 3];
        for c in 0..3 {
            let normalized = f32::from(pixel[c]) / 255.0;
            let contrasted = (normalized - 0.5) * contrast + 0.5;
            let value = contrasted * brightness * 255.0;
            adjusted[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        out.put_pixel(x, y, Rgb(adjusted));
    }
    out
}

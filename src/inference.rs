//! Inference backend abstraction and the segmentation engine
//!
//! A [`SegmentationBackend`] runs the raw tensor inference; the
//! [`SegmentationEngine`] wraps a backend with the tensor plumbing around it:
//! normalizing an RGB raster into the model's square input, turning the
//! output tensor back into a soft alpha matte at the raster's dimensions,
//! and composing the final RGBA result.
//!
//! The engine is a single shared resource. All access is serialized through
//! the [`InferenceGate`](crate::gate::InferenceGate); the engine itself holds
//! no synchronization.

use crate::error::{CutoutError, Result};
use image::{DynamicImage, GrayImage, RgbaImage};
use ndarray::Array4;
use tracing::debug;

/// Per-channel normalization applied before inference (ISNet convention)
const NORMALIZATION_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const NORMALIZATION_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Trait for segmentation inference backends
///
/// Backends are constructed cheaply and load their model weights on
/// [`initialize`](Self::initialize). Implementations are not required to be
/// safe under concurrent calls; the caller serializes access.
pub trait SegmentationBackend: Send {
    /// Load model weights and prepare the backend for inference
    ///
    /// # Errors
    /// - Model loading or validation failures
    fn initialize(&mut self) -> Result<()>;

    /// Run inference on a normalized NCHW input tensor
    ///
    /// Input shape is `(1, 3, s, s)` where `s` is [`input_size`](Self::input_size);
    /// output shape is `(1, 1, h, w)` holding the foreground probability map.
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Side length of the square model input
    fn input_size(&self) -> u32;

    /// Check if the backend has loaded its model
    fn is_initialized(&self) -> bool;
}

/// Placement of a raster on the square model canvas
#[derive(Debug, Clone, Copy)]
struct CanvasPlacement {
    offset_x: u32,
    offset_y: u32,
    scaled_width: u32,
    scaled_height: u32,
}

/// Segmentation engine: backend plus tensor pre/post-processing
pub struct SegmentationEngine {
    backend: Box<dyn SegmentationBackend>,
}

impl SegmentationEngine {
    /// Create an engine around an uninitialized backend
    ///
    /// Model weights are loaded lazily on the first call to
    /// [`remove_background`](Self::remove_background).
    #[must_use]
    pub fn new(backend: Box<dyn SegmentationBackend>) -> Self {
        Self { backend }
    }

    /// Segment the foreground of an RGB raster into an RGBA result
    ///
    /// The output carries the input's RGB channels with a soft alpha matte
    /// (0 = background, 255 = foreground) at identical dimensions.
    ///
    /// # Errors
    /// - Model initialization failures on first use
    /// - Inference failures
    pub fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        if !self.backend.is_initialized() {
            self.backend.initialize()?;
        }

        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(CutoutError::processing("cannot segment an empty raster"));
        }

        let (tensor, placement) = self.image_to_tensor(&rgb)?;
        let output = self.backend.infer(&tensor)?;
        let matte = Self::tensor_to_matte(&output, placement, (width, height))?;

        let (min_alpha, max_alpha) = matte
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        debug!(min_alpha, max_alpha, "segmentation matte alpha extrema");

        let mut result = RgbaImage::new(width, height);
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let alpha = matte.get_pixel(x, y)[0];
            result.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], alpha]));
        }
        Ok(result)
    }

    /// Normalize an RGB raster onto the model's square input canvas
    ///
    /// The raster is scaled to fit (aspect preserved), centered on a white
    /// canvas, and converted to a normalized NCHW tensor.
    fn image_to_tensor(&self, rgb: &image::RgbImage) -> Result<(Array4<f32>, CanvasPlacement)> {
        let target = self.backend.input_size();
        if target == 0 {
            return Err(CutoutError::model("backend reports zero input size"));
        }
        let (orig_width, orig_height) = rgb.dimensions();

        let target_f = target as f32;
        let scale = (target_f / orig_width as f32).min(target_f / orig_height as f32);
        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target);

        let resized = image::imageops::resize(
            rgb,
            scaled_width,
            scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let offset_x = (target - scaled_width) / 2;
        let offset_y = (target - scaled_height) / 2;

        let target_usize = target as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, target_usize, target_usize));
        // White canvas outside the image region.
        for c in 0..3 {
            let fill = (1.0 - NORMALIZATION_MEAN[c]) / NORMALIZATION_STD[c];
            tensor
                .index_axis_mut(ndarray::Axis(1), c)
                .iter_mut()
                .for_each(|v| *v = fill);
        }
        for (x, y, pixel) in resized.enumerate_pixels() {
            let tx = (x + offset_x) as usize;
            let ty = (y + offset_y) as usize;
            for c in 0..3 {
                let normalized =
                    (f32::from(pixel[c]) / 255.0 - NORMALIZATION_MEAN[c]) / NORMALIZATION_STD[c];
                tensor[[0, c, ty, tx]] = normalized;
            }
        }

        Ok((
            tensor,
            CanvasPlacement {
                offset_x,
                offset_y,
                scaled_width,
                scaled_height,
            },
        ))
    }

    /// Convert the output tensor back into a matte at the raster's dimensions
    ///
    /// Crops the image region out of the square output, min-max normalizes
    /// the probabilities, and resizes back to the original dimensions.
    fn tensor_to_matte(
        output: &Array4<f32>,
        placement: CanvasPlacement,
        target_dimensions: (u32, u32),
    ) -> Result<GrayImage> {
        let shape = output.shape();
        if shape.len() != 4 || shape[0] != 1 || shape[1] != 1 {
            return Err(CutoutError::inference(format!(
                "expected (1, 1, h, w) output tensor, got {shape:?}"
            )));
        }
        let (out_height, out_width) = (shape[2], shape[3]);

        let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
        for &value in output.iter() {
            min = min.min(value);
            max = max.max(value);
        }
        let range = if (max - min).abs() < f32::EPSILON {
            1.0
        } else {
            max - min
        };

        let mut cropped = GrayImage::new(placement.scaled_width, placement.scaled_height);
        for y in 0..placement.scaled_height {
            for x in 0..placement.scaled_width {
                let sy = (y + placement.offset_y) as usize;
                let sx = (x + placement.offset_x) as usize;
                if sy >= out_height || sx >= out_width {
                    return Err(CutoutError::inference(format!(
                        "output tensor {out_width}x{out_height} smaller than canvas placement"
                    )));
                }
                let normalized = ((output[[0, 0, sy, sx]] - min) / range).clamp(0.0, 1.0);
                cropped.put_pixel(x, y, image::Luma([(normalized * 255.0).round() as u8]));
            }
        }

        let (target_width, target_height) = target_dimensions;
        if cropped.dimensions() == (target_width, target_height) {
            return Ok(cropped);
        }
        Ok(image::imageops::resize(
            &cropped,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        ))
    }
}

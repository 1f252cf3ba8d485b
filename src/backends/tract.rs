//! Tract backend for segmentation inference
//!
//! Pure Rust ONNX inference with no external dependencies, so the process
//! footprint stays small and predictable on memory-constrained hosts. Tract
//! evaluates a model single-threaded per run; there is no internal thread
//! pool to configure, which keeps one inference's memory ceiling bounded.

use crate::error::{CutoutError, Result};
use crate::inference::SegmentationBackend;
use ndarray::Array4;
use std::path::PathBuf;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info};

/// Type alias for the complex Tract model type
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Configuration for the Tract backend, passed at the single construction point
#[derive(Debug, Clone)]
pub struct TractBackendConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,
    /// Side length of the square model input
    pub input_size: u32,
}

impl TractBackendConfig {
    /// Configuration for an ISNet-style model with a 1024x1024 input
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: 1024,
        }
    }
}

/// Tract-based segmentation backend
///
/// Construction is cheap; model weights load on [`initialize`], which the
/// engine invokes lazily on first use behind the inference gate.
pub struct TractSegmentationBackend {
    config: TractBackendConfig,
    model: Option<TractModel>,
}

impl TractSegmentationBackend {
    /// Create an uninitialized backend from its configuration
    #[must_use]
    pub fn new(config: TractBackendConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    fn load_model(&mut self) -> Result<()> {
        let model_load_start = Instant::now();

        info!(
            model_path = %self.config.model_path.display(),
            input_size = self.config.input_size,
            "loading segmentation model"
        );

        let model = onnx()
            .model_for_path(&self.config.model_path)
            .map_err(|e| CutoutError::model(format!("Failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| CutoutError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| CutoutError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);

        info!(
            elapsed_ms = model_load_start.elapsed().as_millis() as u64,
            "segmentation model ready"
        );
        Ok(())
    }
}

impl SegmentationBackend for TractSegmentationBackend {
    fn initialize(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }
        self.load_model()
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CutoutError::inference("Tract model not initialized"))?;

        debug!(input_shape = ?input.shape(), "running tract inference");
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| CutoutError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| CutoutError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| CutoutError::inference(format!("Failed to convert output tensor: {e}")))?;

        let output_shape = output_data.shape();
        if output_shape.len() != 4 {
            return Err(CutoutError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let output_array = Array4::from_shape_vec(
            (
                output_shape.first().copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(1),
                output_shape.get(2).copied().unwrap_or(1),
                output_shape.get(3).copied().unwrap_or(1),
            ),
            output_data.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| CutoutError::inference(format!("Failed to reshape output tensor: {e}")))?;

        debug!(
            elapsed_ms = inference_start.elapsed().as_millis() as u64,
            output_shape = ?output_array.shape(),
            "tract inference completed"
        );
        Ok(output_array)
    }

    fn input_size(&self) -> u32 {
        self.config.input_size
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}

//! Mock segmentation backend for tests
//!
//! Produces a deterministic soft matte (a centered foreground disc with a
//! feathered edge) without any model weights, and records call timing so
//! tests can assert serialization and ordering of inference calls.

use crate::error::{CutoutError, Result};
use crate::inference::SegmentationBackend;
use ndarray::Array4;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Timing record for a single mock inference call
#[derive(Debug, Clone, Copy)]
pub struct InferenceCall {
    pub started: Instant,
    pub finished: Instant,
}

/// Shared log of mock inference calls
pub type CallLog = Arc<Mutex<Vec<InferenceCall>>>;

/// Deterministic mock backend
pub struct MockSegmentationBackend {
    input_size: u32,
    delay: Duration,
    fail_inference: bool,
    initialized: bool,
    calls: CallLog,
}

impl MockSegmentationBackend {
    /// Create a mock backend with a small input size for fast tests
    #[must_use]
    pub fn new() -> Self {
        Self {
            input_size: 64,
            delay: Duration::ZERO,
            fail_inference: false,
            initialized: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep for `delay` inside each inference call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every inference call fail
    #[must_use]
    pub fn with_failure(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    /// Handle to the shared call log
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

impl Default for MockSegmentationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationBackend for MockSegmentationBackend {
    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let started = Instant::now();
        if !self.initialized {
            return Err(CutoutError::inference("mock backend not initialized"));
        }

        if !self.delay.is_zero() {
            // Runs on a blocking thread via the gate, so a plain sleep is fine.
            std::thread::sleep(self.delay);
        }

        let result = if self.fail_inference {
            Err(CutoutError::inference("mock inference failure"))
        } else {
            let shape = input.shape();
            let (height, width) = (shape[2], shape[3]);
            let mut output = Array4::<f32>::zeros((1, 1, height, width));

            // Centered disc with a feathered edge: foreground in the middle,
            // background at the borders.
            let cy = height as f32 / 2.0;
            let cx = width as f32 / 2.0;
            let radius = cx.min(cy) * 0.6;
            let feather = radius * 0.4;
            for y in 0..height {
                for x in 0..width {
                    let dist = ((y as f32 - cy).powi(2) + (x as f32 - cx).powi(2)).sqrt();
                    let value = if dist <= radius {
                        1.0
                    } else if dist <= radius + feather {
                        1.0 - (dist - radius) / feather
                    } else {
                        0.0
                    };
                    output[[0, 0, y, x]] = value;
                }
            }
            Ok(output)
        };

        self.calls.lock().expect("call log poisoned").push(InferenceCall {
            started,
            finished: Instant::now(),
        });
        result
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

//! Mutual-exclusion boundary around the segmentation engine
//!
//! The engine holds large model weights and is not safe to run concurrently
//! on a memory-constrained host. Every inference call, from the synchronous
//! and the queued path alike, goes through one [`InferenceGate`]: a single
//! semaphore permit bounds the system to one in-flight inference, and the
//! CPU-heavy call itself runs on a blocking thread so status polls and new
//! submissions keep being served while a job is processing.

use crate::error::{CutoutError, Result};
use crate::inference::{SegmentationBackend, SegmentationEngine};
use image::{DynamicImage, RgbaImage};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Serializes access to the shared segmentation engine
#[derive(Clone)]
pub struct InferenceGate {
    permit: Arc<Semaphore>,
    engine: Arc<Mutex<SegmentationEngine>>,
}

impl InferenceGate {
    /// Create a gate around an uninitialized backend
    ///
    /// The engine loads its model lazily inside the gate on first use, so
    /// concurrent first calls cannot race the initialization.
    #[must_use]
    pub fn new(backend: Box<dyn SegmentationBackend>) -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
            engine: Arc::new(Mutex::new(SegmentationEngine::new(backend))),
        }
    }

    /// Run one gated inference call
    ///
    /// Suspends (without busy-waiting) while another inference is in flight,
    /// then offloads the call to a blocking thread. The permit is held until
    /// the call returns.
    ///
    /// # Errors
    /// - Engine initialization or inference failures
    /// - Worker thread join failures
    pub async fn remove_background(&self, image: DynamicImage) -> Result<RgbaImage> {
        let _permit = self
            .permit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CutoutError::processing("inference gate closed"))?;

        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| CutoutError::processing("segmentation engine mutex poisoned"))?;
            engine.remove_background(&image)
        })
        .await
        .map_err(|e| CutoutError::processing(format!("inference task failed to join: {e}")))?
    }
}

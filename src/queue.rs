//! Job queue and the single worker loop
//!
//! An unbounded FIFO channel feeds exactly one worker, which drives each job
//! through the shared pipeline and updates the registry. A failed job is
//! isolated: the worker logs it, marks it failed, and moves on.

use crate::error::Result;
use crate::processor::{encode_png, RemovalPipeline};
use crate::registry::TaskRegistry;
use crate::store::ResultStore;
use image::DynamicImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// One queued job, owned by the queue until the worker dequeues it
pub struct QueueEntry {
    pub job_id: Uuid,
    pub image: DynamicImage,
    pub enhance: bool,
}

/// Receiving half of the job queue, consumed by [`run_worker`]
pub type JobReceiver = mpsc::UnboundedReceiver<QueueEntry>;

/// Submission half of the job queue
///
/// `enqueue` is O(1) and non-blocking; the returned position is the depth at
/// enqueue time, a best-effort hint that is not adjusted as earlier jobs
/// complete.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
    depth: Arc<AtomicUsize>,
}

impl JobQueue {
    /// Create a queue and the receiver for its single worker
    #[must_use]
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                depth: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Enqueue a job, returning its approximate queue position (1-based)
    ///
    /// # Errors
    /// Returns a processing error when the worker has shut down.
    pub fn enqueue(&self, entry: QueueEntry) -> Result<usize> {
        let position = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send(entry).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            crate::error::CutoutError::processing("job queue is closed")
        })?;
        Ok(position)
    }

    /// Jobs waiting or in flight
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    fn finish_one(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Single worker loop: dequeue, process, record outcome
///
/// Runs until the submission side is dropped. Jobs are processed strictly in
/// submission order, one at a time; any pipeline failure is captured in the
/// registry and never stops the loop.
pub async fn run_worker(
    mut rx: JobReceiver,
    queue: JobQueue,
    registry: TaskRegistry,
    pipeline: Arc<RemovalPipeline>,
    results: ResultStore,
) {
    info!("job worker started");
    while let Some(entry) = rx.recv().await {
        let job_id = entry.job_id;
        registry.set_processing(job_id);
        info!(%job_id, enhance = entry.enhance, "job processing");

        match process_entry(entry, &pipeline, &results).await {
            Ok(result_path) => {
                registry.set_completed(job_id, result_path);
                info!(%job_id, "job completed");
            },
            Err(err) => {
                error!(%job_id, error = %err, "job failed");
                registry.set_failed(job_id, err.to_string());
            },
        }
        queue.finish_one();
    }
    info!("job worker stopped");
}

async fn process_entry(
    entry: QueueEntry,
    pipeline: &RemovalPipeline,
    results: &ResultStore,
) -> Result<std::path::PathBuf> {
    let result = pipeline.process(entry.image, entry.enhance).await?;
    let png = encode_png(&result)?;
    results.save(entry.job_id, &png)
}

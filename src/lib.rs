#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! # Cutout Server
//!
//! HTTP background-removal service built for memory-constrained hosts. The
//! segmentation model is expensive, so the service is organized around a
//! single-flight scheduler: requests are accepted faster than the host can
//! safely process them, inference calls are serialized through a gate to
//! bound peak memory, and per-job lifecycle state supports asynchronous
//! polling and result retrieval.
//!
//! ## Architecture
//!
//! - [`preprocessing`]: deterministic downscale-to-bound before inference
//! - [`inference`] / [`backends`]: the segmentation engine behind a backend trait
//! - [`gate`]: at most one inference in flight, system-wide
//! - [`enhancement`]: optional cosmetic chain with a non-failing fallback
//! - [`registry`] / [`queue`]: job lifecycle and the single worker loop
//! - [`store`]: on-disk results plus the in-memory stash
//! - [`server`]: the axum surface tying the above together
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cutout::{AppState, ServerConfig};
//! use cutout::backends::test_utils::MockSegmentationBackend;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::builder()
//!     .max_dimension(2048)
//!     .results_dir("results")
//!     .build()?;
//! let (state, rx) = AppState::new(Box::new(MockSegmentationBackend::new()), &config)?;
//! tokio::spawn(cutout::queue::run_worker(
//!     rx,
//!     state.queue.clone(),
//!     state.registry.clone(),
//!     state.pipeline.clone(),
//!     state.results.clone(),
//! ));
//! let app = cutout::server::app_router(state);
//! let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod enhancement;
pub mod error;
pub mod gate;
pub mod inference;
pub mod preprocessing;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod server;
pub mod store;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{CutoutError, Result};
pub use gate::InferenceGate;
pub use inference::{SegmentationBackend, SegmentationEngine};
pub use processor::{encode_png, RemovalPipeline};
pub use queue::{JobQueue, QueueEntry};
pub use registry::{Job, JobStatus, TaskRegistry};
pub use server::{app_router, AppState};
pub use store::{ResultStore, StashEntry, StashStore};

#[cfg(feature = "tract")]
pub use backends::tract::{TractBackendConfig, TractSegmentationBackend};

//! HTTP surface of the background-removal service
//!
//! Thin axum layer over the core: handlers validate uploads, talk to the
//! registry/queue/stores, and map [`CutoutError`] kinds onto HTTP statuses.

mod handlers;

use crate::config::ServerConfig;
use crate::error::{CutoutError, Result};
use crate::inference::SegmentationBackend;
use crate::processor::RemovalPipeline;
use crate::queue::{JobQueue, JobReceiver};
use crate::registry::TaskRegistry;
use crate::store::{ResultStore, StashStore};
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Uploads above this limit are rejected outright
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub registry: TaskRegistry,
    pub queue: JobQueue,
    pub pipeline: Arc<RemovalPipeline>,
    pub results: ResultStore,
    pub stash: StashStore,
}

impl AppState {
    /// Wire up the core components around a segmentation backend
    ///
    /// Returns the state plus the queue receiver; the caller spawns
    /// [`run_worker`](crate::queue::run_worker) with it.
    ///
    /// # Errors
    /// Returns an IO error when the results directory cannot be created.
    pub fn new(
        backend: Box<dyn SegmentationBackend>,
        config: &ServerConfig,
    ) -> Result<(Self, JobReceiver)> {
        let pipeline = Arc::new(RemovalPipeline::new(backend, config));
        let results = ResultStore::open(&config.results_dir)?;
        let (queue, rx) = JobQueue::new();
        Ok((
            Self {
                registry: TaskRegistry::new(),
                queue,
                pipeline,
                results,
                stash: StashStore::new(),
            },
            rx,
        ))
    }
}

/// Build the service router
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/remove-bg", post(handlers::remove_background))
        .route("/remove-bg-async", post(handlers::enqueue_job))
        .route("/status/{job_id}", get(handlers::job_status))
        .route("/result/{job_id}", get(handlers::job_result))
        .route("/stash", post(handlers::stash_blob))
        .route("/download-stashed/{stash_id}", get(handlers::download_stashed))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP-facing error wrapper
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<CutoutError> for AppError {
    fn from(err: CutoutError) -> Self {
        match err {
            CutoutError::Validation(msg) => AppError::BadRequest(msg),
            CutoutError::NotReady(msg) => AppError::BadRequest(msg),
            CutoutError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

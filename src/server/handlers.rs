//! Route handlers

use super::{AppError, AppState};
use crate::error::{CutoutError, Result};
use crate::processor::encode_png;
use crate::queue::QueueEntry;
use crate::registry::JobStatus;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Serialize)]
pub(super) struct HealthResponse {
    message: String,
}

#[derive(Serialize)]
pub(super) struct SubmitResponse {
    job_id: Uuid,
    queue_position: usize,
}

#[derive(Serialize)]
pub(super) struct StatusResponse {
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct StashResponse {
    stash_id: Uuid,
}

#[derive(Deserialize)]
pub(super) struct ResultQuery {
    download_name: Option<String>,
}

/// Decoded multipart image upload
struct ImageUpload {
    image: DynamicImage,
    filename: String,
    enhance: bool,
}

/// Read an image upload with its `enhance` flag from a multipart body
///
/// Rejects non-image content types before any decoding work.
async fn read_image_upload(mut multipart: Multipart) -> Result<ImageUpload> {
    let mut image = None;
    let mut filename = String::from("upload");
    let mut enhance = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CutoutError::validation(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("image/") {
                    return Err(CutoutError::validation("File must be an image"));
                }
                if let Some(name) = field.file_name() {
                    filename = name.to_string();
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| CutoutError::validation(format!("failed to read upload: {e}")))?;
                let decoded = image::load_from_memory(&bytes).map_err(|e| {
                    CutoutError::validation(format!("failed to decode image: {e}"))
                })?;
                image = Some(decoded);
            },
            "enhance" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| CutoutError::validation(format!("invalid enhance field: {e}")))?;
                enhance = matches!(value.trim(), "true" | "1" | "on");
            },
            _ => {},
        }
    }

    let image = image.ok_or_else(|| CutoutError::validation("missing image file field"))?;
    Ok(ImageUpload {
        image,
        filename,
        enhance,
    })
}

/// Strip characters that would break a Content-Disposition header
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\r' | '\n' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

fn attachment_response(bytes: Vec<u8>, content_type: &str, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", sanitize_filename(filename)),
            ),
        ],
        bytes,
    )
        .into_response()
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Background removal service is running".to_string(),
    })
}

/// Synchronous path: run the pipeline inline and stream the PNG back
pub(super) async fn remove_background(
    State(state): State<AppState>,
    multipart: Multipart,
) -> std::result::Result<Response, AppError> {
    let upload = read_image_upload(multipart).await?;
    info!(filename = %upload.filename, enhance = upload.enhance, "sync removal request");

    let result = state.pipeline.process(upload.image, upload.enhance).await?;
    let png = encode_png(&result)?;

    let download_name = format!("removed_bg_{}", upload.filename);
    Ok(attachment_response(png, "image/png", &download_name))
}

/// Asynchronous path: register a pending job and enqueue it
pub(super) async fn enqueue_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> std::result::Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let upload = read_image_upload(multipart).await?;

    let job_id = state.registry.create();
    let queue_position = state.queue.enqueue(QueueEntry {
        job_id,
        image: upload.image,
        enhance: upload.enhance,
    })?;
    info!(%job_id, queue_position, "job enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            queue_position,
        }),
    ))
}

pub(super) async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> std::result::Result<Json<StatusResponse>, AppError> {
    let job = state
        .registry
        .get(job_id)
        .ok_or_else(|| AppError::NotFound(format!("unknown job {job_id}")))?;

    let queue_length = match job.status {
        JobStatus::Pending => Some(state.queue.depth()),
        _ => None,
    };
    Ok(Json(StatusResponse {
        status: job.status,
        queue_length,
        error: job.error,
    }))
}

pub(super) async fn job_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<ResultQuery>,
) -> std::result::Result<Response, AppError> {
    let job = state
        .registry
        .get(job_id)
        .ok_or_else(|| AppError::NotFound(format!("unknown job {job_id}")))?;

    match job.status {
        JobStatus::Completed => {
            let bytes = state.results.load(job_id)?;
            let filename = query
                .download_name
                .unwrap_or_else(|| format!("{job_id}.png"));
            Ok(attachment_response(bytes, "image/png", &filename))
        },
        JobStatus::Failed => Err(AppError::BadRequest(format!(
            "job {job_id} failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        ))),
        JobStatus::Pending | JobStatus::Processing => Err(CutoutError::not_ready(format!(
            "job {job_id} is not completed yet"
        ))
        .into()),
    }
}

/// Stash client-pre-encoded bytes for a later native download
pub(super) async fn stash_blob(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<StashResponse>, AppError> {
    let mut stashed = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name().unwrap_or_default() == "file" {
            let filename = field
                .file_name()
                .unwrap_or("download.bin")
                .to_string();
            // Bytes are stored verbatim; content is opaque to the server.
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
            stashed = Some((bytes.to_vec(), filename));
        }
    }

    let (bytes, filename) =
        stashed.ok_or_else(|| AppError::BadRequest("missing file field".to_string()))?;
    let stash_id = state.stash.stash(bytes, filename);
    info!(%stash_id, "blob stashed");
    Ok(Json(StashResponse { stash_id }))
}

pub(super) async fn download_stashed(
    State(state): State<AppState>,
    Path(stash_id): Path<Uuid>,
) -> std::result::Result<Response, AppError> {
    let entry = state
        .stash
        .fetch(stash_id)
        .ok_or_else(|| AppError::NotFound(format!("unknown stash entry {stash_id}")))?;
    Ok(attachment_response(
        entry.bytes,
        "application/octet-stream",
        &entry.filename,
    ))
}

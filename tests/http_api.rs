//! End-to-end tests driving the HTTP surface with the mock backend

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cutout::backends::test_utils::{CallLog, MockSegmentationBackend};
use cutout::{AppState, ServerConfig};
use std::io::Cursor;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "cutout-test-boundary";

struct TestServer {
    app: Router,
    _results_dir: tempfile::TempDir,
}

fn spawn_server(backend: MockSegmentationBackend, max_dimension: u32) -> TestServer {
    let results_dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::builder()
        .max_dimension(max_dimension)
        .results_dir(results_dir.path())
        .build()
        .unwrap();
    let (state, rx) = AppState::new(Box::new(backend), &config).unwrap();
    tokio::spawn(cutout::queue::run_worker(
        rx,
        state.queue.clone(),
        state.registry.clone(),
        state.pipeline.clone(),
        state.results.clone(),
    ));
    TestServer {
        app: cutout::server::app_router(state),
        _results_dir: results_dir,
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([220, 30, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

struct MultipartPart<'a> {
    name: &'a str,
    filename: Option<&'a str>,
    content_type: Option<&'a str>,
    data: &'a [u8],
}

fn multipart_body(parts: &[MultipartPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn image_upload_request(uri: &str, image: &[u8], content_type: &str, enhance: bool) -> Request<Body> {
    let body = multipart_body(&[
        MultipartPart {
            name: "file",
            filename: Some("photo.png"),
            content_type: Some(content_type),
            data: image,
        },
        MultipartPart {
            name: "enhance",
            filename: None,
            content_type: None,
            data: if enhance { b"true" } else { b"false" },
        },
    ]);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn submit_job(app: &Router, image: &[u8], enhance: bool) -> Uuid {
    let response = app
        .clone()
        .oneshot(image_upload_request("/remove-bg-async", image, "image/png", enhance))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = response_json(response).await;
    json["job_id"].as_str().unwrap().parse().unwrap()
}

async fn job_status(app: &Router, job_id: Uuid) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/status/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

async fn wait_for_terminal(app: &Router, job_id: Uuid) -> String {
    for _ in 0..300 {
        let status = job_status(app, job_id).await["status"]
            .as_str()
            .unwrap()
            .to_string();
        if status == "completed" || status == "failed" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = spawn_server(MockSegmentationBackend::new(), 1024);
    let response = server
        .app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("running"));
}

#[tokio::test]
async fn test_status_unknown_job_is_404() {
    let server = spawn_server(MockSegmentationBackend::new(), 1024);
    let response = server
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/status/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_unknown_job_is_404() {
    let server = spawn_server(MockSegmentationBackend::new(), 1024);
    let response = server
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/result/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_image_upload_rejected() {
    let server = spawn_server(MockSegmentationBackend::new(), 1024);
    for uri in ["/remove-bg", "/remove-bg-async"] {
        let request = image_upload_request(uri, b"just some text", "text/plain", false);
        let response = server.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("image"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_path_streams_png_attachment() {
    let server = spawn_server(MockSegmentationBackend::new(), 256);
    let response = server
        .app
        .clone()
        .oneshot(image_upload_request("/remove-bg", &png_bytes(600, 400), "image/png", false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "image/png"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("removed_bg_photo.png"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(decoded.width().max(decoded.height()), 256);

    let rgba = decoded.to_rgba8();
    let alphas: Vec<u8> = rgba.pixels().map(|p| p[3]).collect();
    assert!(
        alphas.iter().any(|&a| a < 255),
        "alpha must not be uniformly opaque"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_job_lifecycle() {
    let server = spawn_server(MockSegmentationBackend::new(), 1024);
    let job_id = submit_job(&server.app, &png_bytes(3000, 2000), false).await;

    assert_eq!(wait_for_terminal(&server.app, job_id).await, "completed");
    let status = job_status(&server.app, job_id).await;
    assert!(status.get("error").is_none() || status["error"].is_null());

    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/result/{job_id}?download_name=final.png"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("final.png"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    // 3000x2000 bounded to the 1024 threshold, aspect preserved.
    assert_eq!(decoded.width(), 1024);
    assert!(decoded.height().abs_diff(683) <= 1);
    let rgba = decoded.to_rgba8();
    assert!(rgba.pixels().any(|p| p[3] < 255));
    assert!(rgba.pixels().any(|p| p[3] > 200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_result_before_completion_is_not_ready() {
    let backend = MockSegmentationBackend::new().with_delay(Duration::from_millis(300));
    let server = spawn_server(backend, 256);
    let job_id = submit_job(&server.app, &png_bytes(64, 64), false).await;

    // Polled repeatedly before completion: always a client error, never a result.
    for _ in 0..3 {
        let response = server
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/result/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert_eq!(wait_for_terminal(&server.app, job_id).await, "completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_job_reports_error_via_polling() {
    let server = spawn_server(MockSegmentationBackend::new().with_failure(), 256);
    let job_id = submit_job(&server.app, &png_bytes(64, 64), false).await;

    assert_eq!(wait_for_terminal(&server.app, job_id).await, "failed");
    let status = job_status(&server.app, job_id).await;
    assert!(status["error"].as_str().unwrap().contains("inference"));

    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/result/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_order_and_no_overlapping_inference() {
    let backend = MockSegmentationBackend::new().with_delay(Duration::from_millis(40));
    let calls: CallLog = backend.call_log();
    let server = spawn_server(backend, 256);

    let mut job_ids = Vec::new();
    for _ in 0..3 {
        job_ids.push(submit_job(&server.app, &png_bytes(64, 64), false).await);
    }
    for &job_id in &job_ids {
        assert_eq!(wait_for_terminal(&server.app, job_id).await, "completed");
    }

    let log = calls.lock().unwrap();
    assert_eq!(log.len(), 3);
    for pair in log.windows(2) {
        assert!(
            pair[0].finished <= pair[1].started,
            "inference calls overlapped in time"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_job_pending_while_first_processing() {
    let backend = MockSegmentationBackend::new().with_delay(Duration::from_millis(400));
    let server = spawn_server(backend, 256);

    let first = submit_job(&server.app, &png_bytes(64, 64), false).await;
    let second = submit_job(&server.app, &png_bytes(64, 64), false).await;

    // Give the worker a moment to dequeue the first job.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let first_status = job_status(&server.app, first).await;
    let second_status = job_status(&server.app, second).await;
    assert_eq!(first_status["status"], "processing");
    assert_eq!(second_status["status"], "pending");
    assert!(second_status["queue_length"].as_u64().unwrap() >= 1);

    assert_eq!(wait_for_terminal(&server.app, first).await, "completed");
    assert_eq!(wait_for_terminal(&server.app, second).await, "completed");
}

#[tokio::test]
async fn test_stash_roundtrip() {
    let server = spawn_server(MockSegmentationBackend::new(), 1024);
    let blob: Vec<u8> = (0..=255).collect();

    let body = multipart_body(&[MultipartPart {
        name: "file",
        filename: Some("edited-image.png"),
        content_type: Some("application/octet-stream"),
        data: &blob,
    }]);
    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stash")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stash_id = response_json(response).await["stash_id"]
        .as_str()
        .unwrap()
        .to_string();

    // The same id may be fetched repeatedly.
    for _ in 0..2 {
        let response = server
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/download-stashed/{stash_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("edited-image.png"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.to_vec(), blob);
    }
}

#[tokio::test]
async fn test_download_stashed_unknown_is_404() {
    let server = spawn_server(MockSegmentationBackend::new(), 1024);
    let response = server
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/download-stashed/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

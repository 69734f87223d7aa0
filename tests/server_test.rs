use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use docnorm::config::Config;
use docnorm::engine::{OcrEngine, Rotation};
use docnorm::engines::fake::{marker_page, FakeEngine};
use docnorm::preprocessing::steps::rotate::rotate_cardinal;
use docnorm::server::{router, AppState};
use image::{DynamicImage, ImageFormat};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "docnorm-test-boundary";

fn app(engine: impl OcrEngine + 'static) -> Router {
    router(AppState {
        engine: Arc::new(engine),
        config: Arc::new(Config::default()),
    })
}

fn png_fixture() -> Vec<u8> {
    let page = rotate_cardinal(&marker_page(160, 200), Rotation::Deg90);
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(page)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    png
}

/// Multipart body with an optional `file` part followed by text fields
fn multipart(file: Option<&[u8]>, fields: &[(&str, &str)]) -> Body {
    let mut body = Vec::new();
    if let Some(data) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"page.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn post(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_health_check() {
    tokio_test::block_on(async {
        let response = app(FakeEngine::constant(""))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health = json_body(response).await;
        assert_eq!(health["status"], "ok");
        assert!(!health["version"].as_str().unwrap().is_empty());
    });
}

#[tokio::test]
async fn test_info_reports_engine_and_steps() {
    let response = app(FakeEngine::constant(""))
        .oneshot(Request::get("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let info = json_body(response).await;
    assert_eq!(info["engine"], "fake");
    assert_eq!(info["default_language"], "eng");
    let steps: Vec<&str> = info["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert!(steps.contains(&"correct_orientation"));
    assert!(steps.contains(&"crop_to_text"));
}

#[tokio::test]
async fn test_ocr_reads_reoriented_page() {
    let png = png_fixture();
    let body = multipart(
        Some(&png),
        &[
            ("steps", "correct_orientation,resize_normalize"),
            ("language", "english"),
        ],
    );
    let response = app(FakeEngine::upright_marker())
        .oneshot(post("/ocr", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = json_body(response).await;
    assert_eq!(result["engine"], "fake");
    assert!(result["text"].as_str().unwrap().contains("12345"));
    assert_eq!(result["preprocessing"]["width"], 800);
    assert_eq!(result["preprocessing"]["orientation"]["chosen_angle"], 270);
    assert_eq!(
        result["preprocessing"]["orientation"]["rationale"],
        "OCR_SCORE_WIN"
    );
    assert_eq!(result["words"].as_array().unwrap().len(), 2);
    assert_eq!(result["stats"]["word_count"], 3);
    assert_eq!(result["stats"]["line_count"], 2);
    assert_eq!(result["stats"]["character_count"], 19);
}

#[tokio::test]
async fn test_preprocess_returns_png_with_diagnostics() {
    let png = png_fixture();
    let body = multipart(Some(&png), &[("preset", "minimal"), ("steps", "orientation,resize")]);
    let response = app(FakeEngine::upright_marker())
        .oneshot(post("/preprocess", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers["x-docnorm-orientation"], "270");
    assert_eq!(headers["x-docnorm-rationale"], "OCR_SCORE_WIN");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let image = image::load_from_memory(&bytes).unwrap();
    assert_eq!((image.width(), image.height()), (800, 1000));
}

#[tokio::test]
async fn test_unknown_step_is_bad_request() {
    let png = png_fixture();
    let body = multipart(Some(&png), &[("steps", "denoise,sparkle")]);
    let response = app(FakeEngine::constant(""))
        .oneshot(post("/preprocess", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error = json_body(response).await;
    assert_eq!(error["code"], "CONFIGURATION_ERROR");
    assert!(error["error"].as_str().unwrap().contains("sparkle"));
}

#[tokio::test]
async fn test_oversized_config_is_bad_request() {
    let png = png_fixture();
    let body = multipart(
        Some(&png),
        &[(
            "config",
            r#"{"resize":{"target_width":4000000000},"deskew":{"resolution":0.000001}}"#,
        )],
    );
    let response = app(FakeEngine::constant(""))
        .oneshot(post("/preprocess", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_path_like_language_is_bad_request() {
    let png = png_fixture();
    let body = multipart(Some(&png), &[("language", "../../tmp/x")]);
    let engine = FakeEngine::constant("Total 42");
    let response = app(engine).oneshot(post("/ocr", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let body = multipart(None, &[("preset", "default")]);
    let response = app(FakeEngine::constant(""))
        .oneshot(post("/ocr", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_undecodable_image_is_bad_request() {
    let body = multipart(Some(b"definitely not an image"), &[]);
    let response = app(FakeEngine::constant(""))
        .oneshot(post("/preprocess", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_IMAGE");
}

#[tokio::test]
async fn test_backend_failure_is_service_unavailable() {
    let png = png_fixture();
    let body = multipart(Some(&png), &[("steps", "crop_to_text")]);
    let response = app(FakeEngine::unavailable("engine offline"))
        .oneshot(post("/preprocess", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "BACKEND_UNAVAILABLE");
}

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use road_watch::{
    image::Annotator,
    models::{DetectionModel, ModelRegistry, RawDetection},
    web::{create_app, AppState},
    Config, Result,
};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "roadwatch-test-boundary";

/// 对任意图像返回一个坑洼的模型
struct PotholeModel {
    names: Vec<String>,
}

impl DetectionModel for PotholeModel {
    fn infer(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(vec![RawDetection {
            class_id: 0,
            confidence: 0.91,
            x1: w * 0.25,
            y1: h * 0.5,
            x2: w * 0.75,
            y2: h * 0.9,
        }])
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn input_size(&self) -> (u32, u32) {
        (640, 640)
    }
}

struct TestApp {
    router: Router,
    root: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_max_request_size(None)
    }

    fn with_max_request_size(limit: Option<usize>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::new(
            "127.0.0.1:0".into(),
            root.path().join("models").to_string_lossy().into_owned(),
            root.path().join("static").to_string_lossy().into_owned(),
            None,
            3600,
            300,
            false,
        )
        .unwrap();
        if let Some(limit) = limit {
            config.server_config.max_request_size = limit;
        }

        let model: Arc<dyn DetectionModel> = Arc::new(PotholeModel {
            names: vec!["pothole".to_string()],
        });
        let registry = ModelRegistry::from_models([("pothole", model)]);
        let state = AppState::new(config, registry, Annotator::boxes_only()).unwrap();

        Self {
            router: create_app(state),
            root,
        }
    }

    fn dir(&self, name: &str) -> std::path::PathBuf {
        self.root.path().join("static").join(name)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

enum Part<'a> {
    File { name: &'a str, file_name: &'a str, data: Vec<u8> },
    Text { name: &'a str, value: &'a str },
}

fn multipart_request(uri: &str, parts: Vec<Part<'_>>) -> Request<Body> {
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { name, file_name, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(40, 30, Rgb([70, 70, 70]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn home_reports_running() {
    let app = TestApp::new();
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["message"],
        "AI Traffic Violation & Pothole Detection API is running!"
    );
}

#[tokio::test]
async fn missing_file_part_is_rejected() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_image",
        vec![Part::Text { name: "model_type", value: "pothole" }],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file part");
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_image",
        vec![Part::File { name: "file", file_name: "", data: png_bytes() }],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No selected file");
}

#[tokio::test]
async fn disallowed_extension_is_rejected() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_image",
        vec![
            Part::File { name: "file", file_name: "notes.txt", data: b"hello".to_vec() },
            Part::Text { name: "model_type", value: "pothole" },
        ],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid file format");
    assert_eq!(file_count(&app.dir("uploads")), 0);
}

#[tokio::test]
async fn mp4_is_not_an_image() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_image",
        vec![
            Part::File { name: "file", file_name: "clip.mp4", data: b"....".to_vec() },
            Part::Text { name: "model_type", value: "pothole" },
        ],
    );

    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pothole_image_end_to_end() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_image",
        vec![
            Part::Text { name: "model_type", value: "pothole" },
            Part::File { name: "file", file_name: "../road 1.PNG", data: png_bytes() },
        ],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Detection complete");
    assert_eq!(json["model_used"], "pothole");

    let objects = json["detected_objects"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["class"], "pothole");
    assert!(objects[0]["confidence"].as_f64().unwrap() >= 0.5);
    assert_eq!(objects[0]["bbox"], serde_json::json!([10, 15, 30, 27]));

    // 上传文件在请求结束后删除，输出文件保留
    assert_eq!(file_count(&app.dir("uploads")), 0);
    assert_eq!(file_count(&app.dir("outputs")), 1);

    let processed = json["processed_image"].as_str().unwrap();
    assert!(processed.starts_with("static/outputs/"));
    assert!(processed.ends_with(".jpg"));

    let request = Request::builder()
        .uri(format!("/{}", processed))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unregistered_task_is_rejected_without_output() {
    let app = TestApp::new();
    // 默认任务 traffic_violation 未加载
    let request = multipart_request(
        "/detect_image",
        vec![Part::File { name: "file", file_name: "road.png", data: png_bytes() }],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_TASK");
    assert!(json["error"].as_str().unwrap().contains("traffic_violation"));
    assert_eq!(file_count(&app.dir("uploads")), 0);
    assert_eq!(file_count(&app.dir("outputs")), 0);
}

#[tokio::test]
async fn corrupt_image_is_unreadable() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_image",
        vec![
            Part::File { name: "file", file_name: "road.jpg", data: b"not really a jpeg".to_vec() },
            Part::Text { name: "model_type", value: "pothole" },
        ],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "UNREADABLE_IMAGE");
    assert_eq!(file_count(&app.dir("uploads")), 0);
    assert_eq!(file_count(&app.dir("outputs")), 0);
}

#[tokio::test]
async fn video_endpoint_checks_extension() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_video",
        vec![
            Part::File { name: "file", file_name: "road.png", data: png_bytes() },
            Part::Text { name: "model_type", value: "pothole" },
        ],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid file format");
}

#[cfg(not(feature = "video"))]
#[tokio::test]
async fn video_without_feature_is_not_implemented() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_video",
        vec![
            Part::File { name: "file", file_name: "clip.mp4", data: b"....".to_vec() },
            Part::Text { name: "model_type", value: "pothole" },
        ],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(json["code"], "VIDEO_UNSUPPORTED");
    assert_eq!(file_count(&app.dir("uploads")), 0);
}

#[tokio::test]
async fn health_lists_loaded_models() {
    let app = TestApp::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["models_loaded"], serde_json::json!(["pothole"]));
}

#[tokio::test]
async fn info_reports_registry_stats() {
    let app = TestApp::new();
    let request = Request::builder().uri("/api/info").body(Body::empty()).unwrap();

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["models"]["tasks"][0]["task"], "pothole");
    assert_eq!(json["models"]["tasks"][0]["classes"], 1);
    assert_eq!(json["features"]["labels"], false);
}

#[tokio::test]
async fn file_part_without_filename_is_missing() {
    let app = TestApp::new();
    let request = multipart_request(
        "/detect_image",
        vec![
            Part::Text { name: "file", value: "not really a file" },
            Part::Text { name: "model_type", value: "pothole" },
        ],
    );

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file part");
}

fn oversized_request() -> Request<Body> {
    multipart_request(
        "/detect_image",
        vec![
            Part::Text { name: "model_type", value: "pothole" },
            Part::File { name: "file", file_name: "road.png", data: vec![0u8; 8 * 1024] },
        ],
    )
}

#[tokio::test]
async fn oversized_upload_with_content_length_is_json_413() {
    let app = TestApp::with_max_request_size(Some(1024));
    let mut request = oversized_request();
    let len = axum::body::HttpBody::size_hint(request.body()).exact().unwrap();
    request
        .headers_mut()
        .insert(header::CONTENT_LENGTH, header::HeaderValue::from(len));

    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(file_count(&app.dir("uploads")), 0);
}

#[tokio::test]
async fn oversized_upload_without_content_length_is_json_413() {
    let app = TestApp::with_max_request_size(Some(1024));

    let (status, json) = app.send(oversized_request()).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(json["error"], "Request body too large");
}

use crate::{
    detection::{DetectionRecord, VideoProcessor, VideoSummary},
    image::ImageLoader,
    utils::error::DetectError,
    web::{
        extractors::{DetectionUpload, RequestId},
        AppState,
    },
    Result,
};
use axum::{extract::State, response::Json};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::time::Instant;

/// 图像接口允许的扩展名
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// 视频接口允许的扩展名
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];

/// 图像检测响应
#[derive(Debug, Serialize)]
pub struct ImageDetectionResponse {
    pub message: String,
    pub model_used: String,
    pub detected_objects: Vec<DetectionRecord>,
    pub processed_image: String,
}

/// 视频检测响应
#[derive(Debug, Serialize)]
pub struct VideoDetectionResponse {
    pub message: String,
    pub model_used: String,
    pub processed_video: String,
    pub summary: VideoSummary,
}

/// 首页：服务状态
pub async fn home_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "AI Traffic Violation & Pothole Detection API is running!"
    }))
}

/// 图像检测
pub async fn detect_image_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    upload: DetectionUpload,
) -> Result<Json<ImageDetectionResponse>> {
    let start_time = Instant::now();
    let extension = upload.checked_extension(IMAGE_EXTENSIONS)?;
    let task = upload.model_type.clone();

    tracing::info!(
        "Processing image detection: request_id={}, file={}, bytes={}, model_type={}",
        request_id,
        upload.display_name(),
        upload.data.len(),
        task
    );

    // 任务无效时不落盘
    state.detector.registry().get(&task)?;

    let guard = state.storage.save_upload(&upload.data, &extension).await?;
    let (output_path, public_path) = state.storage.output_path("jpg");

    let detector = state.detector.clone();
    let input_path = guard.path().to_path_buf();
    let blocking_task = task.clone();
    let blocking_output = output_path.clone();

    let outcome = tokio::task::spawn_blocking(move || -> Result<Vec<DetectionRecord>> {
        let detection = detector.detect(&input_path, &blocking_task)?;
        ImageLoader::save_jpeg(&detection.annotated, &blocking_output)?;
        Ok(detection.records)
    })
    .await
    .map_err(|e| DetectError::Internal(format!("Detection task failed: {}", e)))
    .and_then(|result| result);

    drop(guard);

    let records = match outcome {
        Ok(records) => records,
        Err(e) => {
            remove_partial_output(&output_path);
            return Err(e);
        }
    };

    tracing::info!(
        "Image detection completed: request_id={}, objects={}, time={:.3}s",
        request_id,
        records.len(),
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ImageDetectionResponse {
        message: "Detection complete".to_string(),
        model_used: task,
        detected_objects: records,
        processed_image: public_path,
    }))
}

/// 视频检测
pub async fn detect_video_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    upload: DetectionUpload,
) -> Result<Json<VideoDetectionResponse>> {
    let start_time = Instant::now();
    let extension = upload.checked_extension(VIDEO_EXTENSIONS)?;
    let task = upload.model_type.clone();

    tracing::info!(
        "Processing video detection: request_id={}, file={}, bytes={}, model_type={}",
        request_id,
        upload.display_name(),
        upload.data.len(),
        task
    );

    state.detector.registry().get(&task)?;
    if !VideoProcessor::is_supported() {
        return Err(DetectError::VideoUnsupported);
    }

    let guard = state.storage.save_upload(&upload.data, &extension).await?;
    let (output_path, public_path) = state.storage.output_path("mp4");

    let processor = state.video.clone();
    let input_path = guard.path().to_path_buf();
    let blocking_task = task.clone();
    let blocking_output = output_path.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        processor.process(&input_path, &blocking_task, &blocking_output)
    })
    .await
    .map_err(|e| DetectError::Internal(format!("Video task failed: {}", e)))
    .and_then(|result| result);

    drop(guard);

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            remove_partial_output(&output_path);
            return Err(e);
        }
    };

    tracing::info!(
        "Video detection completed: request_id={}, frames={}, time={:.3}s",
        request_id,
        summary.frames_processed,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(VideoDetectionResponse {
        message: "Video processing complete".to_string(),
        model_used: task,
        processed_video: public_path,
        summary,
    }))
}

/// 健康检查端点
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let registry = state.detector.registry();
    let status = if registry.is_empty() { "degraded" } else { "healthy" };

    Json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "models_loaded": registry.tasks(),
    }))
}

/// 服务信息端点
pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "Road Watch Detection Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "models": state.detector.registry().stats(),
        "features": {
            "video": VideoProcessor::is_supported(),
            "labels": state.labels_enabled,
            "image_extensions": IMAGE_EXTENSIONS,
            "video_extensions": VIDEO_EXTENSIONS,
            "output_ttl_secs": state.config.retention.output_ttl.as_secs(),
        }
    }))
}

fn remove_partial_output(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}

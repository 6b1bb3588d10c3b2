use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid model type '{0}'. Choose from: {1:?}")]
    InvalidTask(String, Vec<String>),

    #[error("Could not load the image: {0}")]
    UnreadableImage(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Could not open the video: {0}")]
    UnreadableVideo(String),

    #[error("Video processing is not enabled in this build")]
    VideoUnsupported,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encode error: {0}")]
    ImageEncode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[cfg(feature = "video")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl DetectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DetectError::InvalidTask(_, _) => StatusCode::BAD_REQUEST,
            DetectError::UnreadableImage(_) => StatusCode::BAD_REQUEST,
            DetectError::InvalidFileFormat(_) => StatusCode::BAD_REQUEST,
            DetectError::UnreadableVideo(_) => StatusCode::BAD_REQUEST,
            DetectError::VideoUnsupported => StatusCode::NOT_IMPLEMENTED,
            DetectError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            DetectError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            DetectError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DetectError::InvalidTask(_, _) => "INVALID_TASK",
            DetectError::UnreadableImage(_) => "UNREADABLE_IMAGE",
            DetectError::InvalidFileFormat(_) => "INVALID_FILE_FORMAT",
            DetectError::UnreadableVideo(_) => "UNREADABLE_VIDEO",
            DetectError::VideoUnsupported => "VIDEO_UNSUPPORTED",
            DetectError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            DetectError::RequestTimeout => "REQUEST_TIMEOUT",
            DetectError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            DetectError::Inference(_) => "INFERENCE_ERROR",
            DetectError::Config(_) => "CONFIG_ERROR",
            DetectError::Io(_) => "IO_ERROR",
            DetectError::ImageEncode(_) => "IMAGE_ENCODE_ERROR",
            DetectError::Ort(_) => "ORT_ERROR",
            #[cfg(feature = "video")]
            DetectError::OpenCv(_) => "OPENCV_ERROR",
            DetectError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 面向客户端的错误消息
    ///
    /// 上传校验类错误沿用固定文案，其余使用完整描述
    pub fn client_message(&self) -> String {
        match self {
            DetectError::InvalidFileFormat(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "error": self.client_message(),
            "code": self.error_code(),
        });

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }

        (status, axum::Json(error_response)).into_response()
    }
}

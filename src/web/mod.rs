pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{
    detection::{Detector, VideoProcessor},
    image::Annotator,
    models::ModelRegistry,
    storage::{spawn_retention, Storage},
    utils::error::DetectError,
    Config, Result,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
};

/// 请求处理器共享状态，启动时构建一次
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub detector: Arc<Detector>,
    pub video: Arc<VideoProcessor>,
    pub storage: Arc<Storage>,
    pub labels_enabled: bool,
}

impl AppState {
    pub fn new(config: Config, registry: ModelRegistry, annotator: Annotator) -> Result<Self> {
        let storage = Arc::new(Storage::new(&config)?);
        let labels_enabled = annotator.draws_labels();
        let detector = Arc::new(Detector::new(Arc::new(registry), annotator));
        let video = Arc::new(VideoProcessor::new(Arc::clone(&detector)));

        Ok(Self {
            config: Arc::new(config),
            detector,
            video,
            storage,
            labels_enabled,
        })
    }
}

pub async fn serve(config: Config) -> Result<()> {
    // 加载模型（缺失的模型只记录日志）
    let registry = ModelRegistry::load(&config);
    tracing::info!("Registered tasks: {:?}", registry.tasks());

    let annotator = Annotator::from_optional_font(config.resolve_label_font().as_deref());
    let state = AppState::new(config.clone(), registry, annotator)?;

    spawn_retention(
        Arc::clone(&state.storage),
        config.retention.output_ttl,
        config.retention.cleanup_interval,
    );

    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        DetectError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /detect_image     - Image upload (png, jpg, jpeg)");
    tracing::info!("  POST /detect_video     - Video upload (mp4)");
    tracing::info!("  GET  /                 - Service status");
    tracing::info!("  GET  /health           - Health check");
    tracing::info!("  GET  /api/info         - Service information");
    tracing::info!("  GET  /static/outputs/* - Processed files");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        DetectError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DetectError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

/// 构建应用路由
pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = Duration::from_secs(state.config.server_config.request_timeout);
    let outputs = ServeDir::new(state.storage.outputs_dir());

    Router::new()
        // 检测API
        .route("/detect_image", post(handlers::detect_image_handler))
        .route("/detect_video", post(handlers::detect_video_handler))
        // 系统路由
        .route("/", get(handlers::home_handler))
        .route("/health", get(handlers::health_handler))
        .route("/api/info", get(handlers::info_handler))
        // 处理结果文件
        .nest_service("/static/outputs", outputs)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(axum::middleware::map_response(middleware::json_error_bodies))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

use crate::utils::error::DetectError;
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

/// 交通违章检测任务名
pub const TRAFFIC_VIOLATION: &str = "traffic_violation";

/// 坑洼检测任务名
pub const POTHOLE: &str = "pothole";

/// 未指定 model_type 时使用的任务
pub const DEFAULT_TASK: &str = TRAFFIC_VIOLATION;

/// 固定的任务与模型文件对应表
const MODEL_FILES: &[(&str, &str)] = &[
    (POTHOLE, "pothole_best.onnx"),
    (TRAFFIC_VIOLATION, "traffic_best.onnx"),
];

/// 未指定字体时依次尝试的系统字体
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 静态资源根目录（uploads / outputs）
    pub static_root: PathBuf,

    /// 标注字体
    pub label_font: Option<PathBuf>,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 文件保留策略
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 置信度阈值
    pub conf_threshold: f32,

    /// NMS IoU阈值
    pub iou_threshold: f32,

    /// 单张图最大检测数
    pub max_detections: usize,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            intra_threads: (num_cpus::get() * 3 / 4).max(1),
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// 输出文件保留时长，零表示不清理
    pub output_ttl: Duration,

    /// 清理任务间隔
    pub cleanup_interval: Duration,
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        static_root: String,
        label_font: Option<String>,
        output_ttl_secs: u64,
        cleanup_interval_secs: u64,
        dev_mode: bool,
    ) -> Result<Self> {
        if cleanup_interval_secs == 0 && output_ttl_secs > 0 {
            return Err(DetectError::Config(
                "cleanup interval must be positive when output TTL is enabled".to_string(),
            ));
        }

        let server_config = ServerConfig {
            // 视频逐帧推理耗时较长
            request_timeout: if dev_mode { 900 } else { 300 },
            max_request_size: 100 * 1024 * 1024, // 100MB
        };

        let retention = RetentionConfig {
            output_ttl: Duration::from_secs(output_ttl_secs),
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            static_root: PathBuf::from(static_root),
            label_font: label_font.map(PathBuf::from),
            dev_mode,
            onnx_config: OnnxConfig::default(),
            server_config,
            retention,
        })
    }

    /// 获取任务名与模型路径列表
    pub fn model_paths(&self) -> Vec<(&'static str, PathBuf)> {
        MODEL_FILES
            .iter()
            .map(|(task, file)| (*task, self.models_dir.join(file)))
            .collect()
    }

    /// 上传目录
    pub fn uploads_dir(&self) -> PathBuf {
        self.static_root.join("uploads")
    }

    /// 输出目录
    pub fn outputs_dir(&self) -> PathBuf {
        self.static_root.join("outputs")
    }

    /// 解析标注字体路径：显式配置优先，其次是常见系统字体
    pub fn resolve_label_font(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.label_font {
            return Some(path.clone());
        }

        FALLBACK_FONTS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

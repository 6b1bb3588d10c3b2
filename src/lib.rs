pub mod config;
pub mod detection;
pub mod image;
pub mod models;
pub mod storage;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use detection::{Detection, DetectionRecord, Detector};
pub use models::ModelRegistry;
pub use utils::error::DetectError;

pub type Result<T> = std::result::Result<T, DetectError>;

pub mod backend;
pub mod registry;
pub mod yolo;

pub use backend::{DetectionModel, RawDetection};
pub use registry::{ModelRegistry, RegistryStats, TaskStats};
pub use yolo::{YoloModel, YoloParams};

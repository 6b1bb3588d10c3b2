pub mod detector;
pub mod types;
pub mod video;

pub use detector::Detector;
pub use types::{Detection, DetectionRecord, VideoSummary};
pub use video::VideoProcessor;

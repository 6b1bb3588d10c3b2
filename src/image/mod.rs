pub mod annotate;
pub mod loader;
pub mod postprocessing;
pub mod preprocessing;

pub use annotate::Annotator;
pub use loader::ImageLoader;
pub use preprocessing::{ImagePreprocessor, Letterbox};

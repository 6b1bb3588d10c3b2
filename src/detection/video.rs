use crate::detection::{Detector, VideoSummary};
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// 源视频缺少帧率信息时使用
#[cfg_attr(not(feature = "video"), allow(dead_code))]
const FALLBACK_FPS: f64 = 30.0;

/// 视频逐帧检测
pub struct VideoProcessor {
    detector: Arc<Detector>,
}

impl VideoProcessor {
    pub fn new(detector: Arc<Detector>) -> Self {
        Self { detector }
    }

    /// 当前构建是否支持视频
    pub fn is_supported() -> bool {
        cfg!(feature = "video")
    }

    #[cfg(not(feature = "video"))]
    pub fn process(&self, _video_path: &Path, task: &str, _output_path: &Path) -> Result<VideoSummary> {
        self.detector.registry().get(task)?;
        Err(crate::utils::error::DetectError::VideoUnsupported)
    }

    /// 读取视频每一帧执行检测，并把标注后的帧写入 mp4v 编码的输出文件
    #[cfg(feature = "video")]
    pub fn process(&self, video_path: &Path, task: &str, output_path: &Path) -> Result<VideoSummary> {
        use crate::utils::error::DetectError;
        use image::DynamicImage;
        use opencv::{
            core::{Mat, Size},
            prelude::*,
            videoio::{self, VideoCapture, VideoWriter},
        };
        use std::time::Instant;

        // 先校验任务，避免无效请求打开视频
        self.detector.registry().get(task)?;

        let start_time = Instant::now();
        let source = path_str(video_path)?;
        let unreadable = |e: opencv::Error| {
            DetectError::UnreadableVideo(format!("{}: {}", video_path.display(), e))
        };
        let mut capture = VideoCapture::from_file(source, videoio::CAP_ANY).map_err(unreadable)?;
        if !capture.is_opened().map_err(unreadable)? {
            return Err(DetectError::UnreadableVideo(format!(
                "{} could not be opened",
                video_path.display()
            )));
        }

        let fps = match capture.get(videoio::CAP_PROP_FPS).map_err(unreadable)? {
            fps if fps.is_finite() && fps > 0.0 => fps,
            _ => FALLBACK_FPS,
        };

        tracing::info!("Processing video {} at {:.1} fps", video_path.display(), fps);

        let target = path_str(output_path)?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let mut writer: Option<VideoWriter> = None;
        let mut summary = VideoSummary::default();
        let mut frame = Mat::default();

        while capture.read(&mut frame).map_err(unreadable)? {
            if frame.empty() {
                break;
            }

            let rgb = frame_to_rgb(&frame)?;
            let (width, height) = rgb.dimensions();
            let detection = self
                .detector
                .detect_image(&DynamicImage::ImageRgb8(rgb), task)?;
            summary.record_frame(&detection.records);

            if writer.is_none() {
                let opened = VideoWriter::new(
                    target,
                    fourcc,
                    fps,
                    Size::new(width as i32, height as i32),
                    true,
                )?;
                if !opened.is_opened()? {
                    return Err(DetectError::Internal(format!(
                        "Failed to open video writer at {}",
                        output_path.display()
                    )));
                }
                writer = Some(opened);
            }

            if let Some(ref mut writer) = writer {
                writer.write(&rgb_to_frame(&detection.annotated)?)?;
            }

            if summary.frames_processed % 100 == 0 {
                tracing::debug!("Processed {} frames", summary.frames_processed);
            }
        }

        if summary.frames_processed == 0 {
            return Err(DetectError::UnreadableVideo(format!(
                "{} contains no decodable frames",
                video_path.display()
            )));
        }

        tracing::info!(
            "Video completed: task={}, frames={}, detections={}, time={:.3}s",
            task,
            summary.frames_processed,
            summary.total_detections,
            start_time.elapsed().as_secs_f32()
        );

        Ok(summary)
    }
}

#[cfg(feature = "video")]
fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        crate::utils::error::DetectError::Internal(format!(
            "Path is not valid UTF-8: {}",
            path.display()
        ))
    })
}

/// OpenCV BGR 帧转换为 RGB 图像
#[cfg(feature = "video")]
fn frame_to_rgb(frame: &opencv::core::Mat) -> Result<image::RgbImage> {
    use crate::utils::error::DetectError;
    use opencv::prelude::*;

    if frame.typ() != opencv::core::CV_8UC3 {
        return Err(DetectError::UnreadableVideo(format!(
            "Unsupported frame type {}",
            frame.typ()
        )));
    }

    let continuous;
    let frame = if frame.is_continuous() {
        frame
    } else {
        continuous = frame
            .try_clone()
            .map_err(|e| DetectError::UnreadableVideo(e.to_string()))?;
        &continuous
    };

    let (width, height) = (frame.cols() as u32, frame.rows() as u32);
    let rgb: Vec<u8> = frame
        .data_bytes()
        .map_err(|e| DetectError::UnreadableVideo(e.to_string()))?
        .chunks_exact(3)
        .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
        .collect();

    image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| DetectError::UnreadableVideo("Frame buffer size mismatch".to_string()))
}

/// RGB 图像转换为 OpenCV BGR 帧
#[cfg(feature = "video")]
fn rgb_to_frame(image: &image::RgbImage) -> Result<opencv::core::Mat> {
    use opencv::{
        core::{Mat, Scalar, CV_8UC3},
        prelude::*,
    };

    let (width, height) = image.dimensions();
    let mut frame =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;

    for (dst, src) in frame
        .data_bytes_mut()?
        .chunks_exact_mut(3)
        .zip(image.as_raw().chunks_exact(3))
    {
        dst.copy_from_slice(&[src[2], src[1], src[0]]);
    }

    Ok(frame)
}


#[cfg(all(test, feature = "video"))]
mod video_tests {
    use super::*;
    use crate::image::Annotator;
    use crate::models::{DetectionModel, ModelRegistry, RawDetection};
    use crate::utils::error::DetectError;
    use image::DynamicImage;

    struct EmptyModel {
        names: Vec<String>,
    }

    impl DetectionModel for EmptyModel {
        fn infer(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Ok(Vec::new())
        }

        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn input_size(&self) -> (u32, u32) {
            (640, 640)
        }
    }

    #[test]
    fn garbage_video_is_unreadable() {
        let model: Arc<dyn DetectionModel> = Arc::new(EmptyModel {
            names: vec!["pothole".into()],
        });
        let registry = Arc::new(ModelRegistry::from_models([("pothole", model)]));
        let processor = VideoProcessor::new(Arc::new(Detector::new(
            registry,
            Annotator::boxes_only(),
        )));

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"definitely not an mp4 container").unwrap();

        let err = processor
            .process(&input, "pothole", &dir.path().join("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, DetectError::UnreadableVideo(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}

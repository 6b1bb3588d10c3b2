use crate::{
    detection::{Detection, DetectionRecord},
    image::{Annotator, ImageLoader},
    models::{DetectionModel, ModelRegistry, RawDetection},
    Result,
};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// 检测流程：查模型、解码图像、推理、转换结果并绘制
pub struct Detector {
    registry: Arc<ModelRegistry>,
    annotator: Annotator,
}

impl Detector {
    pub fn new(registry: Arc<ModelRegistry>, annotator: Annotator) -> Self {
        Self { registry, annotator }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// 检测磁盘上的图像
    ///
    /// 任务名先于图像校验，未注册的任务不会读取文件。
    pub fn detect(&self, image_path: &Path, task: &str) -> Result<Detection> {
        let model = self.registry.get(task)?;
        let image = ImageLoader::from_path(image_path)?;
        self.run(model.as_ref(), &image, task)
    }

    /// 检测内存中的图像（视频帧等）
    pub fn detect_image(&self, image: &DynamicImage, task: &str) -> Result<Detection> {
        let model = self.registry.get(task)?;
        self.run(model.as_ref(), image, task)
    }

    fn run(&self, model: &dyn DetectionModel, image: &DynamicImage, task: &str) -> Result<Detection> {
        let start_time = Instant::now();

        let raw = model.infer(image)?;
        let inference_time = start_time.elapsed();

        let mut annotated = image.to_rgb8();
        let records: Vec<DetectionRecord> = raw
            .iter()
            .map(|detection| to_record(detection, model))
            .collect();

        self.annotator.draw_all(&mut annotated, &records);

        tracing::info!(
            "Detection completed: task={}, objects={}, inference={:.3}s, total={:.3}s",
            task,
            records.len(),
            inference_time.as_secs_f32(),
            start_time.elapsed().as_secs_f32()
        );

        Ok(Detection { annotated, records })
    }
}

/// 原始检测框转换为整数像素坐标的检测记录
pub fn to_record(raw: &RawDetection, model: &dyn DetectionModel) -> DetectionRecord {
    let (ax, bx) = (raw.x1 as i32, raw.x2 as i32);
    let (ay, by) = (raw.y1 as i32, raw.y2 as i32);

    let confidence = if raw.confidence.is_finite() {
        raw.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let class_name = model
        .class_name(raw.class_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("class_{}", raw.class_id));

    DetectionRecord {
        class_name,
        confidence,
        bbox: [ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)],
    }
}

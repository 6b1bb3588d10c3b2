use crate::Result;
use image::DynamicImage;

/// 模型输出的原始检测框（原图像素坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl RawDetection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// 检测模型接口
///
/// 置信度过滤与NMS由实现方负责，调用方按返回顺序使用结果。
pub trait DetectionModel: Send + Sync {
    /// 对整张图像执行一次前向推理
    fn infer(&self, image: &DynamicImage) -> Result<Vec<RawDetection>>;

    /// 类别ID到名称的映射表
    fn class_names(&self) -> &[String];

    /// 模型输入尺寸 (width, height)
    fn input_size(&self) -> (u32, u32);

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.class_names().get(class_id).map(String::as_str)
    }
}

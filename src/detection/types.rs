use image::RgbImage;
use serde::Serialize;
use std::collections::BTreeMap;

/// 单个检测目标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    /// 类别名称
    #[serde(rename = "class")]
    pub class_name: String,
    /// 置信度 (0.0 - 1.0)
    pub confidence: f32,
    /// 像素坐标 [x1, y1, x2, y2]，x1 <= x2 且 y1 <= y2
    pub bbox: [i32; 4],
}

impl DetectionRecord {
    /// 绘制用标签，如 `pothole 0.87`
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class_name, self.confidence)
    }
}

/// 一次图像检测的结果
#[derive(Debug, Clone)]
pub struct Detection {
    /// 绘制了检测框的图像副本
    pub annotated: RgbImage,
    /// 按模型输出顺序排列的检测结果
    pub records: Vec<DetectionRecord>,
}

/// 视频处理汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct VideoSummary {
    pub frames_processed: u64,
    pub total_detections: u64,
    pub class_counts: BTreeMap<String, u64>,
}

impl VideoSummary {
    pub fn record_frame(&mut self, records: &[DetectionRecord]) {
        self.frames_processed += 1;
        self.total_detections += records.len() as u64;
        for record in records {
            *self.class_counts.entry(record.class_name.clone()).or_default() += 1;
        }
    }
}

use crate::models::RawDetection;
use std::cmp::Ordering;

/// 计算两个框的IoU
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - inter;

    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// 按类别的非极大值抑制
///
/// 结果按置信度降序排列，最多保留 `max_detections` 个。
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.retain(|d| d.confidence.is_finite());
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();

    for candidate in candidates {
        if keep.len() >= max_detections {
            break;
        }

        let suppressed = keep
            .iter()
            .any(|kept| kept.class_id == candidate.class_id && iou(kept, &candidate) > iou_threshold);

        if !suppressed {
            keep.push(candidate);
        }
    }

    keep
}

use crate::detection::DetectionRecord;
use crate::Result;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

/// 框与文字颜色
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// 线宽（像素）
const LINE_THICKNESS: u32 = 2;

/// 标签相对框顶部的偏移
const LABEL_OFFSET: i32 = 10;

const LABEL_SCALE: f32 = 16.0;

/// 检测结果绘制器
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    /// 只画框，不写标签
    pub fn boxes_only() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_SCALE),
        }
    }

    /// 加载标签字体
    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| {
            crate::utils::error::DetectError::Config(format!(
                "Invalid label font {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            font: Some(font),
            scale: PxScale::from(LABEL_SCALE),
        })
    }

    /// 有字体时加载字体，失败则退化为只画框
    pub fn from_optional_font(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::with_font_file(path) {
                Ok(annotator) => {
                    tracing::info!("Label font loaded from {}", path.display());
                    annotator
                }
                Err(e) => {
                    tracing::warn!("{}, labels will not be drawn", e);
                    Self::boxes_only()
                }
            },
            None => {
                tracing::warn!("No label font available, labels will not be drawn");
                Self::boxes_only()
            }
        }
    }

    pub fn draws_labels(&self) -> bool {
        self.font.is_some()
    }

    /// 在图像上绘制一个检测框及其标签
    pub fn draw(&self, canvas: &mut RgbImage, record: &DetectionRecord) {
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let [x1, y1, x2, y2] = record.bbox;
        let max_x = width as i32 - 1;
        let max_y = height as i32 - 1;
        let (x1, x2) = (x1.clamp(0, max_x), x2.clamp(0, max_x));
        let (y1, y2) = (y1.clamp(0, max_y), y2.clamp(0, max_y));

        for inset in 0..LINE_THICKNESS as i32 {
            let w = x2 - x1 + 1 - 2 * inset;
            let h = y2 - y1 + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
        }

        if let Some(ref font) = self.font {
            let text = record.label();
            let (_, text_h) = text_size(self.scale, font, &text);
            // 文字底边落在框顶部上方 LABEL_OFFSET 处
            let y = (y1 - LABEL_OFFSET - text_h as i32).max(0);
            draw_text_mut(canvas, BOX_COLOR, x1, y, self.scale, font, &text);
        }
    }

    /// 绘制全部检测结果
    pub fn draw_all(&self, canvas: &mut RgbImage, records: &[DetectionRecord]) {
        for record in records {
            self.draw(canvas, record);
        }
    }
}

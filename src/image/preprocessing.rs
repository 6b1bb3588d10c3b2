use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// letterbox 填充灰度值，与YOLO训练时保持一致
const PAD_VALUE: u8 = 114;

/// letterbox 变换参数，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    /// 内容在画布上的整数偏移
    pub pad_x: u32,
    pub pad_y: u32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    pub fn new(orig_width: u32, orig_height: u32, target: (u32, u32)) -> Self {
        let (target_w, target_h) = target;
        let scale = (target_w as f32 / orig_width as f32).min(target_h as f32 / orig_height as f32);

        let new_w = ((orig_width as f32 * scale).round() as u32).clamp(1, target_w);
        let new_h = ((orig_height as f32 * scale).round() as u32).clamp(1, target_h);

        Self {
            scale,
            pad_x: Self::offset(target_w - new_w),
            pad_y: Self::offset(target_h - new_h),
            orig_width,
            orig_height,
        }
    }

    /// 奇数余量时上/左少填一像素
    fn offset(slack: u32) -> u32 {
        (slack as f32 / 2.0 - 0.1).round().max(0.0) as u32
    }

    /// 缩放后的内容尺寸
    pub fn scaled_size(&self) -> (u32, u32) {
        (
            ((self.orig_width as f32 * self.scale).round() as u32).max(1),
            ((self.orig_height as f32 * self.scale).round() as u32).max(1),
        )
    }

    /// 模型空间坐标映射回原图，并裁剪到图像范围内
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        let ox = (x - self.pad_x as f32) / self.scale;
        let oy = (y - self.pad_y as f32) / self.scale;
        (
            ox.clamp(0.0, self.orig_width as f32),
            oy.clamp(0.0, self.orig_height as f32),
        )
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// YOLO输入预处理：letterbox 缩放 + 归一化 + NCHW
    pub fn letterbox(image: &DynamicImage, target: (u32, u32)) -> (Array4<f32>, Letterbox) {
        let (orig_w, orig_h) = image.dimensions();
        let params = Letterbox::new(orig_w, orig_h, target);
        let (new_w, new_h) = params.scaled_size();

        let resized = imageops::resize(&image.to_rgb8(), new_w, new_h, FilterType::Triangle);

        let (target_w, target_h) = target;
        let mut canvas = RgbImage::from_pixel(target_w, target_h, Rgb([PAD_VALUE; 3]));
        imageops::overlay(
            &mut canvas,
            &resized,
            params.pad_x as i64,
            params.pad_y as i64,
        );

        let tensor = Self::to_nchw(&canvas);
        (tensor, params)
    }

    /// RGB图像转换为 [1, 3, H, W]，像素值归一化到 [0, 1]
    pub fn to_nchw(image: &RgbImage) -> Array4<f32> {
        let (width, height) = image.dimensions();
        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
    }
}

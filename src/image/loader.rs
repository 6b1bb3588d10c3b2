use crate::utils::error::DetectError;
use crate::Result;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::path::Path;

pub struct ImageLoader;

impl ImageLoader {
    /// 从文件路径加载图像
    ///
    /// 文件不存在、数据损坏或格式不支持都会返回 `UnreadableImage`。
    pub fn from_path(path: &Path) -> Result<DynamicImage> {
        if !path.is_file() {
            return Err(DetectError::UnreadableImage(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let reader = image::ImageReader::open(path)
            .map_err(|e| DetectError::UnreadableImage(format!("{}: {}", path.display(), e)))?
            .with_guessed_format()
            .map_err(|e| DetectError::UnreadableImage(format!("{}: {}", path.display(), e)))?;

        match reader.format() {
            Some(format) if Self::is_supported_format(format) => {}
            Some(format) => {
                return Err(DetectError::UnreadableImage(format!(
                    "{}: unsupported format {:?}",
                    path.display(),
                    format
                )))
            }
            None => {
                return Err(DetectError::UnreadableImage(format!(
                    "{}: unrecognized image data",
                    path.display()
                )))
            }
        }

        reader
            .decode()
            .map_err(|e| DetectError::UnreadableImage(format!("{}: {}", path.display(), e)))
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }

    /// 保存标注结果为JPEG
    pub fn save_jpeg(image: &RgbImage, path: &Path) -> Result<()> {
        image.save_with_format(path, ImageFormat::Jpeg)?;
        Ok(())
    }
}

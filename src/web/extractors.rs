use crate::config::DEFAULT_TASK;
use crate::storage::{extension, sanitize_filename};
use crate::utils::error::DetectError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{multipart::MultipartError, FromRequest, FromRequestParts, Multipart, Request},
    http::{request::Parts, StatusCode},
};

/// 检测接口的multipart上传内容
#[derive(Debug)]
pub struct DetectionUpload {
    /// 客户端原始文件名
    pub file_name: String,
    pub data: Bytes,
    /// 检测任务，默认 traffic_violation
    pub model_type: String,
}

impl DetectionUpload {
    /// 校验扩展名并返回小写扩展名
    pub fn checked_extension(&self, allowed: &[&str]) -> Result<String, DetectError> {
        extension(&self.file_name)
            .filter(|ext| allowed.contains(&ext.as_str()))
            .ok_or_else(|| DetectError::InvalidFileFormat("Invalid file format".to_string()))
    }

    /// 清理后的文件名，仅用于日志
    pub fn display_name(&self) -> String {
        sanitize_filename(&self.file_name)
    }
}

#[async_trait]
impl<S> FromRequest<S> for DetectionUpload
where
    S: Send + Sync,
{
    type Rejection = DetectError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state).await.map_err(|e| {
            tracing::debug!("Rejected non-multipart request: {}", e);
            DetectError::InvalidFileFormat("No file part".to_string())
        })?;

        let mut file: Option<(String, Bytes)> = None;
        let mut model_type: Option<String> = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, "Failed to read multipart field"))?
        {
            let field_name = field.name().unwrap_or("unknown").to_string();

            match field_name.as_str() {
                "file" => {
                    // 没有 filename 的 file 字段不是文件上传
                    let Some(file_name) = field.file_name().map(str::to_string) else {
                        tracing::debug!("Ignoring file field without filename");
                        continue;
                    };
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(e, "Failed to read file data"))?;

                    tracing::debug!("Received file '{}': {} bytes", file_name, data.len());
                    file = Some((file_name, data));
                }
                "model_type" => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, "Failed to read model_type"))?;
                    model_type = Some(value.trim().to_string());
                }
                _ => {
                    tracing::debug!("Ignoring unknown field: {}", field_name);
                }
            }
        }

        let (file_name, data) =
            file.ok_or_else(|| DetectError::InvalidFileFormat("No file part".to_string()))?;

        if file_name.is_empty() {
            return Err(DetectError::InvalidFileFormat("No selected file".to_string()));
        }

        let model_type = model_type
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_TASK.to_string());

        Ok(DetectionUpload {
            file_name,
            data,
            model_type,
        })
    }
}

/// 超出请求体上限的读取错误返回 413，其余按格式错误处理
fn multipart_error(err: MultipartError, context: &str) -> DetectError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return DetectError::PayloadTooLarge;
    }
    DetectError::InvalidFileFormat(format!("{}: {}", context, err))
}

/// 请求ID提取器
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get("X-Request-ID")
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestId(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(file_name: &str) -> DetectionUpload {
        DetectionUpload {
            file_name: file_name.to_string(),
            data: Bytes::from_static(b"data"),
            model_type: DEFAULT_TASK.to_string(),
        }
    }

    #[test]
    fn extension_must_be_allowed() {
        let allowed = ["png", "jpg", "jpeg"];
        assert_eq!(upload("road.JPEG").checked_extension(&allowed).unwrap(), "jpeg");
        assert!(upload("notes.txt").checked_extension(&allowed).is_err());
        assert!(upload("clip.mp4").checked_extension(&allowed).is_err());
        assert!(upload("noext").checked_extension(&allowed).is_err());
    }

    #[test]
    fn display_name_is_sanitized() {
        assert_eq!(upload("../secret/road 1.png").display_name(), "road_1.png");
    }
}

use crate::{Config, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// 上传与输出文件管理
///
/// 文件名使用 UUID 生成，客户端文件名只用于日志。
#[derive(Debug, Clone)]
pub struct Storage {
    uploads_dir: PathBuf,
    outputs_dir: PathBuf,
}

impl Storage {
    /// 创建 uploads / outputs 目录（不存在时）
    pub fn new(config: &Config) -> Result<Self> {
        let uploads_dir = config.uploads_dir();
        let outputs_dir = config.outputs_dir();

        std::fs::create_dir_all(&uploads_dir)?;
        std::fs::create_dir_all(&outputs_dir)?;

        tracing::debug!(
            "Storage ready: uploads={}, outputs={}",
            uploads_dir.display(),
            outputs_dir.display()
        );

        Ok(Self {
            uploads_dir,
            outputs_dir,
        })
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// 保存上传文件，返回的守卫在释放时删除文件
    pub async fn save_upload(&self, bytes: &[u8], extension: &str) -> Result<UploadGuard> {
        let path = self
            .uploads_dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), extension));

        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Saved upload: {} ({} bytes)", path.display(), bytes.len());

        Ok(UploadGuard { path })
    }

    /// 分配新的输出文件路径，同时返回对外路径
    pub fn output_path(&self, extension: &str) -> (PathBuf, String) {
        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
        let public = format!("static/outputs/{}", file_name);
        (self.outputs_dir.join(file_name), public)
    }

    /// 删除修改时间早于 `ttl` 的输出文件
    pub fn sweep_expired(&self, ttl: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.outputs_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let expired = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age >= ttl)
                .unwrap_or(false);

            if expired {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        "Failed to remove expired output {}: {}",
                        entry.path().display(),
                        e
                    ),
                }
            }
        }

        Ok(removed)
    }
}

/// 请求结束时删除的上传文件
#[derive(Debug)]
pub struct UploadGuard {
    path: PathBuf,
}

impl UploadGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove upload {}: {}", self.path.display(), e);
            }
        }
    }
}

/// 启动输出目录定期清理任务，`ttl` 为零时不启动
pub fn spawn_retention(
    storage: Arc<Storage>,
    ttl: Duration,
    interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if ttl.is_zero() {
        tracing::info!("Output retention disabled");
        return None;
    }

    tracing::info!(
        "Output retention: ttl={}s, sweep every {}s",
        ttl.as_secs(),
        interval.as_secs()
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let storage = Arc::clone(&storage);
            match tokio::task::spawn_blocking(move || storage.sweep_expired(ttl)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => tracing::info!("Removed {} expired output files", removed),
                Ok(Err(e)) => tracing::warn!("Output sweep failed: {}", e),
                Err(e) => tracing::error!("Output sweep task panicked: {}", e),
            }
        }
    }))
}

/// 清理客户端文件名：只保留最后一段路径，非安全字符替换为下划线
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// 小写扩展名
pub fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

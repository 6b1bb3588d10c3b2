use crate::models::{DetectionModel, YoloModel};
use crate::utils::error::DetectError;
use crate::{Config, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 任务名到已加载模型的映射，启动时构建一次，之后只读
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<dyn DetectionModel>>,
    intra_threads: usize,
}

impl ModelRegistry {
    /// 按固定任务表加载模型
    ///
    /// 文件缺失或加载失败只记录日志，对应任务不会出现在注册表中。
    pub fn load(config: &Config) -> Self {
        tracing::info!("Loading detection models from {}", config.models_dir.display());

        let mut models: BTreeMap<String, Arc<dyn DetectionModel>> = BTreeMap::new();

        for (task, path) in config.model_paths() {
            if !path.exists() {
                tracing::error!("{} model not found at {}", task, path.display());
                continue;
            }

            match YoloModel::load(&path, &config.onnx_config) {
                Ok(model) => {
                    tracing::info!("Loaded {} model successfully from {}", task, path.display());
                    models.insert(task.to_string(), Arc::new(model));
                }
                Err(e) => {
                    tracing::warn!("Failed to load {} model from {}: {}", task, path.display(), e);
                }
            }
        }

        if models.is_empty() {
            tracing::warn!("No detection models loaded, every detection request will be rejected");
        }

        Self {
            models,
            intra_threads: config.onnx_config.intra_threads,
        }
    }

    /// 从已构建的模型创建注册表
    pub fn from_models<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn DetectionModel>)>,
        S: Into<String>,
    {
        Self {
            models: models
                .into_iter()
                .map(|(task, model)| (task.into(), model))
                .collect(),
            intra_threads: 0,
        }
    }

    /// 获取任务对应的模型
    pub fn get(&self, task: &str) -> Result<Arc<dyn DetectionModel>> {
        self.models
            .get(task)
            .cloned()
            .ok_or_else(|| DetectError::InvalidTask(task.to_string(), self.task_names()))
    }

    pub fn contains(&self, task: &str) -> bool {
        self.models.contains_key(task)
    }

    /// 已加载的任务名（有序）
    pub fn tasks(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    fn task_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// 获取模型统计信息
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            tasks: self
                .models
                .iter()
                .map(|(task, model)| TaskStats {
                    task: task.clone(),
                    classes: model.class_names().len(),
                    input_size: model.input_size(),
                })
                .collect(),
            intra_threads: self.intra_threads,
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub tasks: Vec<TaskStats>,
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStats {
    pub task: String,
    pub classes: usize,
    pub input_size: (u32, u32),
}

use crate::config::OnnxConfig;
use crate::image::postprocessing::non_max_suppression;
use crate::image::preprocessing::{ImagePreprocessor, Letterbox};
use crate::models::{DetectionModel, RawDetection};
use crate::utils::error::DetectError;
use crate::Result;
use image::{DynamicImage, GenericImageView};
use ndarray::{ArrayD, Ix3};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::{Tensor, ValueType},
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// YOLOv8 默认输入尺寸
const DEFAULT_INPUT_SIZE: u32 = 640;

/// 检测后处理参数
#[derive(Debug, Clone, Copy)]
pub struct YoloParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&OnnxConfig> for YoloParams {
    fn from(config: &OnnxConfig) -> Self {
        Self {
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

/// 基于ONNX Runtime的YOLO检测模型
pub struct YoloModel {
    session: Arc<Mutex<Session>>,
    input_name: String,
    output_name: String,
    input_size: (u32, u32), // (width, height)
    class_names: Vec<String>,
    params: YoloParams,
}

impl YoloModel {
    pub fn load(model_path: &Path, config: &OnnxConfig) -> Result<Self> {
        if !model_path.exists() {
            return Err(DetectError::ModelLoad(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading YOLO model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(model_path)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| DetectError::ModelLoad("Model has no inputs".to_string()))?;
        let input_name = input.name.clone();
        let input_dims: Vec<i64> = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            _ => Vec::new(),
        };

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| DetectError::ModelLoad("Model has no outputs".to_string()))?;

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Model output[{}]: '{}'", i, output.name);
        }

        // 导出器写入的自定义元数据：names / imgsz
        let (names_meta, imgsz_meta) = {
            let metadata = session.metadata()?;
            (metadata.custom("names")?, metadata.custom("imgsz")?)
        };

        let class_names = names_meta
            .as_deref()
            .map(parse_class_names)
            .unwrap_or_default();
        if class_names.is_empty() {
            tracing::warn!(
                "Model {} carries no class names, falling back to numeric labels",
                model_path.display()
            );
        }

        // 优先使用输入张量的静态形状，其次 imgsz 元数据
        let input_size = input_size_from_dims(&input_dims)
            .or_else(|| imgsz_meta.as_deref().and_then(parse_input_size))
            .unwrap_or((DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE));

        tracing::info!(
            "YOLO model ready: input='{}' {}x{}, output='{}', classes={}",
            input_name,
            input_size.0,
            input_size.1,
            output_name,
            class_names.len()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            input_size,
            class_names,
            params: YoloParams::from(config),
        })
    }

    fn run(&self, input: ndarray::Array4<f32>) -> Result<ArrayD<f32>> {
        let input_tensor = Tensor::from_array(input)?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        match outputs.get(&self.output_name) {
            Some(output) => Ok(output.try_extract_array::<f32>()?.into_owned()),
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                Err(DetectError::Inference(format!(
                    "Output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )))
            }
        }
    }
}

impl DetectionModel for YoloModel {
    fn infer(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError::UnreadableImage("Image has zero size".to_string()));
        }

        let (input, letterbox) = ImagePreprocessor::letterbox(image, self.input_size);
        let prediction = self.run(input)?;

        let num_classes = (!self.class_names.is_empty()).then_some(self.class_names.len());
        decode_predictions(&prediction, num_classes, &letterbox, self.params)
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}

/// 解码YOLOv8输出：[1, 4 + nc, anchors] 或 [1, anchors, 4 + nc]
pub fn decode_predictions(
    prediction: &ArrayD<f32>,
    num_classes: Option<usize>,
    letterbox: &Letterbox,
    params: YoloParams,
) -> Result<Vec<RawDetection>> {
    let output = prediction
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| {
            DetectError::Inference(format!(
                "Unsupported output shape: {:?}, expected 3D (batch, features, anchors)",
                prediction.shape()
            ))
        })?;

    let (batch, dim1, dim2) = output.dim();
    if batch != 1 {
        return Err(DetectError::Inference(format!(
            "Expected batch size 1, got {}",
            batch
        )));
    }

    // 特征维 = 4 个框坐标 + 类别数
    let features_first = match num_classes {
        Some(nc) if dim1 == nc + 4 => true,
        Some(nc) if dim2 == nc + 4 => false,
        _ => dim1 <= dim2,
    };

    let output = output.index_axis_move(ndarray::Axis(0), 0);
    let table = if features_first { output.reversed_axes() } else { output };
    let (anchors, features) = table.dim();

    if features < 5 {
        return Err(DetectError::Inference(format!(
            "Output features too small: {}",
            features
        )));
    }

    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let row = table.row(anchor);

        let (class_id, confidence) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (id, score)| {
                if score > best.1 {
                    (id, score)
                } else {
                    best
                }
            });

        if !confidence.is_finite() || confidence < params.conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        candidates.push(RawDetection {
            class_id,
            confidence: confidence.min(1.0),
            x1,
            y1,
            x2,
            y2,
        });
    }

    tracing::debug!(
        "Decoded {} candidates from {} anchors",
        candidates.len(),
        anchors
    );

    Ok(non_max_suppression(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

/// 解析导出器写入的类别表，如 `{0: 'pothole', 1: 'crack'}`
pub fn parse_class_names(raw: &str) -> Vec<String> {
    let body = raw.trim().trim_start_matches('{').trim_end_matches('}');

    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut rest = body;

    while !rest.trim().is_empty() {
        let Some(colon) = rest.find(':') else { break };
        let Ok(id) = rest[..colon].trim().trim_start_matches(',').trim().parse::<usize>() else {
            break;
        };

        let after = rest[colon + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '\'' || *c == '"') else {
            break;
        };
        let Some(end) = after[1..].find(quote) else { break };

        entries.push((id, after[1..end + 1].to_string()));
        rest = &after[end + 2..];
    }

    let Some(max_id) = entries.iter().map(|(id, _)| *id).max() else {
        return Vec::new();
    };

    let mut names: Vec<String> = (0..=max_id).map(|id| format!("class_{}", id)).collect();
    for (id, name) in entries {
        names[id] = name;
    }
    names
}

/// 从 `[1, 3, H, W]` 输入形状取 (宽, 高)，动态维度返回 `None`
pub fn input_size_from_dims(dims: &[i64]) -> Option<(u32, u32)> {
    match dims {
        [_, _, h, w] if *h > 0 && *w > 0 => {
            Some((u32::try_from(*w).ok()?, u32::try_from(*h).ok()?))
        }
        _ => None,
    }
}

/// 解析 `imgsz` 元数据，如 `[640, 640]`（高, 宽）
pub fn parse_input_size(raw: &str) -> Option<(u32, u32)> {
    let dims: Vec<u32> = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    match dims.as_slice() {
        [size] if *size > 0 => Some((*size, *size)),
        [h, w] if *h > 0 && *w > 0 => Some((*w, *h)),
        _ => None,
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 帧 → Vec<Detection>, 主后端 (YOLOv8) 不可用时回退到人脸检测

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::face::FaceDetector;
use super::types::Detection;
use crate::error::{Error, Result};
use crate::input::Frame;
use crate::models::YOLOv8;

/// 检测器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX 模型路径
    pub model: PathBuf,
    /// 类别名称文件 (每行一个), 缺省使用内置 COCO 类别
    pub names: Option<PathBuf>,
    /// 置信度阈值
    pub confidence: f32,
    /// NMS IoU 阈值
    pub nms: f32,
    /// 推理输入尺寸
    pub input_size: u32,
    pub cuda: bool,
    pub device_id: i32,
    /// 打印各阶段耗时
    pub profile: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/yolov8n.onnx"),
            names: Some(PathBuf::from("models/coco.names")),
            confidence: 0.5,
            nms: 0.4,
            input_size: 640,
            cuda: false,
            device_id: 0,
            profile: false,
        }
    }
}

/// 检测能力接口
///
/// 运行器只依赖此接口, 便于替换后端与测试。
pub trait ObjectDetector: Send {
    /// 单帧检测, 帧无效时返回 `MalformedFrame`
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// 已知类别 (用于配色)
    fn class_names(&self) -> &[String];

    fn name(&self) -> &str;
}

/// 检测器 (构造时选定后端, 运行期间不再切换)
pub enum Detector {
    Object(Box<YOLOv8>),
    Face(FaceDetector),
}

impl Detector {
    /// 优先加载主模型, 失败时记录原因并回退到人脸检测, 不向外返回错误
    pub fn new(config: &DetectorConfig) -> Self {
        match YOLOv8::new(config) {
            Ok(model) => {
                info!("🎯 检测器: YOLOv8 ({})", config.model.display());
                Detector::Object(Box::new(model))
            }
            Err(e) => {
                warn!("⚠️ {}; 回退到人脸检测器", e);
                Detector::Face(FaceDetector::new())
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Detector::Face(_))
    }
}

/// 校验帧尺寸
pub fn ensure_frame(frame: &Frame) -> Result<()> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(Error::MalformedFrame {
            width: frame.width(),
            height: frame.height(),
        });
    }
    Ok(())
}

impl ObjectDetector for Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        ensure_frame(frame)?;
        match self {
            Detector::Object(model) => model
                .run(frame)
                .map_err(|e| Error::inference(format!("{:#}", e))),
            Detector::Face(face) => face.detect(frame),
        }
    }

    fn class_names(&self) -> &[String] {
        match self {
            Detector::Object(model) => model.names(),
            Detector::Face(face) => face.names(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Detector::Object(_) => "yolov8",
            Detector::Face(_) => "face",
        }
    }
}

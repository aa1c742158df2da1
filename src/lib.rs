// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
#![allow(clippy::type_complexity)]

pub mod config; // 配置参数 (JSON文件 + 默认值)
pub mod detection; // 目标检测与跟踪
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod models; // 模型实现
pub mod pipeline; // 处理流水线 (生产者)
pub mod renderer; // 叠加层绘制
pub mod server; // 实时流服务 (消费者)

#[cfg(feature = "onnx")]
pub mod ort_backend;

pub use crate::config::AppConfig;
pub use crate::detection::{
    BBox, CentroidTracker, Detection, Detector, DetectorConfig, ObjectDetector, Track, TrackPoint,
    TrackTable, TrackerConfig,
};
pub use crate::error::{Error, Result};
pub use crate::input::{open_source, Frame, FrameSource, SourceDescriptor};
pub use crate::pipeline::{
    FramePacket, PipelineConfig, PipelineController, PipelineRunner, PipelineState, PipelineStats,
};
pub use crate::renderer::Renderer;

/// 非极大值抑制 (与类别无关)
///
/// 按置信度降序保留检测框, 与任一已保留框的 IoU 超过阈值的框被丢弃。
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bbox.iou(&xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 初始化日志 (RUST_LOG 优先, 默认 info)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ort=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// 本地时间字符串, 用于截图文件名 (例: 20240518_142233)
pub fn gen_time_string() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测与跟踪 (Detection & Tracking)
///
/// - Detector: 目标检测 (YOLOv8 / 人脸回退)
/// - Tracker:  质心跟踪, 维护轨迹生命周期
pub mod detector;
pub mod face;
pub mod tracker;
pub mod types;

pub use detector::{Detector, DetectorConfig, ObjectDetector};
pub use face::FaceDetector;
pub use tracker::{CentroidTracker, Track, TrackTable, TrackerConfig};
pub use types::{BBox, Detection, TrackPoint};

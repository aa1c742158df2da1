// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频处理流水线 (Video Processing Pipeline)
///
/// 生产者/消费者架构:
/// - PipelineRunner:     后台线程, 读帧 → 检测 → 跟踪 → 绘制 → 发布
/// - PipelineState:      互斥保护的最新帧槽位 + 统计 + 运行标志
/// - PipelineController: start/stop/stats/截图, 供流服务调用
pub mod controller;
pub mod runner;
pub mod state;

pub use controller::{HealthStatus, PipelineController};
pub use runner::{encode_jpeg, PipelineConfig, PipelineRunner, RunSummary};
pub use state::{FpsCounter, FramePacket, PipelineState, PipelineStats, TrackSummary};

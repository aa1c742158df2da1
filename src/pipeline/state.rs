// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 共享状态 (运行器 → 流服务)
//!
//! 最新帧与统计放在同一把互斥锁内, 锁只在替换/复制指针时持有。
//! 读者拿到的是 `Arc<FramePacket>` 快照, 不会看到半写的帧。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::detection::{BBox, Track};

/// 聚合统计
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    /// 轨迹表中的轨迹数 (含失活)
    pub total_objects: usize,
    /// 活跃轨迹数
    pub current_objects: usize,
    pub fps: f64,
    pub frame_count: u64,
}

/// 轨迹摘要 (随帧发布)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackSummary {
    pub id: u64,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id(),
            class_name: track.class_name().to_string(),
            confidence: track.confidence(),
            bbox: *track.bbox(),
        }
    }
}

/// 已发布帧 (JPEG 编码后)
#[derive(Clone, Debug)]
pub struct FramePacket {
    /// 运行代数, 每次 start 递增
    pub generation: u64,
    /// 本次运行内的帧序号, 从 1 开始
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
    /// 活跃轨迹
    pub tracks: Vec<TrackSummary>,
}

#[derive(Default)]
struct Slot {
    frame: Option<Arc<FramePacket>>,
    stats: PipelineStats,
}

/// 流水线共享状态 (每次 start 新建)
pub struct PipelineState {
    generation: u64,
    slot: Mutex<Slot>,
    running: AtomicBool,
}

impl PipelineState {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            slot: Mutex::new(Slot::default()),
            running: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 替换最新帧与统计
    pub fn publish(&self, packet: Arc<FramePacket>, stats: PipelineStats) {
        let mut slot = self.lock();
        slot.frame = Some(packet);
        slot.stats = stats;
    }

    pub fn latest_frame(&self) -> Option<Arc<FramePacket>> {
        self.lock().frame.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.lock().stats.clone()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// 请求停止 (协作式, 当前帧处理完后生效)
    pub fn request_stop(&self) {
        self.set_running(false);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// 帧率统计 (1 秒窗口; 第一个窗口内使用累计平均)
#[derive(Debug)]
pub struct FpsCounter {
    count: u64,
    total: u64,
    started: Instant,
    last: Instant,
    current_fps: f64,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsCounter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            count: 0,
            total: 0,
            started: now,
            last: now,
            current_fps: 0.0,
        }
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f64 {
        self.count += 1;
        self.total += 1;
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            self.count = 0;
            self.last = now;
        } else if self.started == self.last {
            let since_start = now.saturating_duration_since(self.started).as_secs_f64();
            if since_start > 0.0 {
                self.current_fps = self.total as f64 / since_start;
            }
        }
        self.current_fps
    }

    pub fn current(&self) -> f64 {
        self.current_fps
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线控制 (start / stop / stats / 截图)
//!
//! 服务层只通过控制器操作运行器: 控制器持有运行线程句柄与当前共享状态,
//! 每次 start 都新建检测器、跟踪器与共享状态, 轨迹ID从 1 重新开始。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use ab_glyph::FontArc;
use serde::Serialize;
use tracing::{info, warn};

use super::runner::{PipelineConfig, PipelineRunner, RunSummary};
use super::state::{FramePacket, PipelineState, PipelineStats};
use crate::config::AppConfig;
use crate::detection::{CentroidTracker, Detector, DetectorConfig, ObjectDetector, TrackerConfig};
use crate::error::{Error, Result};
use crate::input::{open_source, FrameSource, SourceDescriptor};
use crate::renderer::{load_font, Renderer};

/// 健康检查
#[derive(Clone, Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub is_processing: bool,
    /// 运行线程仍持有输入源
    pub source_open: bool,
}

#[derive(Default)]
struct Inner {
    state: Option<Arc<PipelineState>>,
    worker: Option<JoinHandle<RunSummary>>,
    generation: u64,
}

pub struct PipelineController {
    detector: DetectorConfig,
    tracker: TrackerConfig,
    pipeline: PipelineConfig,
    font: Option<FontArc>,
    /// 串行化 start/stop
    lifecycle: Mutex<()>,
    inner: Mutex<Inner>,
}

fn join_worker(handle: JoinHandle<RunSummary>) -> Result<RunSummary> {
    handle
        .join()
        .map_err(|_| Error::worker("pipeline thread panicked"))
}

impl PipelineController {
    pub fn new(config: &AppConfig) -> Self {
        let font = load_font(config.pipeline.font.as_deref());
        Self {
            detector: config.detector.clone(),
            tracker: config.tracker.clone(),
            pipeline: config.pipeline.clone(),
            font,
            lifecycle: Mutex::new(()),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_state(&self) -> Option<Arc<PipelineState>> {
        self.lock().state.clone()
    }

    /// 打开输入并启动运行线程, 返回运行代数
    ///
    /// `confidence` / `nms` 覆盖配置中的阈值。输入无法打开时返回 `SourceUnavailable`,
    /// 已在运行时返回 `AlreadyRunning`。
    pub fn start(&self, source: &str, confidence: Option<f32>, nms: Option<f32>) -> Result<u64> {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_processing() {
            return Err(Error::AlreadyRunning);
        }

        let desc: SourceDescriptor = source.parse()?;
        let source = open_source(&desc)?;

        let mut config = self.detector.clone();
        if let Some(c) = confidence {
            config.confidence = c.clamp(0.0, 1.0);
        }
        if let Some(n) = nms {
            config.nms = n.clamp(0.0, 1.0);
        }
        let detector = Detector::new(&config);

        self.spawn(source, detector)
    }

    /// 使用给定输入与检测器启动
    pub fn start_with<D>(&self, source: Box<dyn FrameSource>, detector: D) -> Result<u64>
    where
        D: ObjectDetector + 'static,
    {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_processing() {
            return Err(Error::AlreadyRunning);
        }
        self.spawn(source, detector)
    }

    fn spawn<D>(&self, source: Box<dyn FrameSource>, detector: D) -> Result<u64>
    where
        D: ObjectDetector + 'static,
    {
        // 回收上一轮已自然结束的线程
        let previous = self.lock().worker.take();
        if let Some(handle) = previous {
            if let Err(e) = join_worker(handle) {
                warn!("⚠️ {}", e);
            }
        }

        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.generation
        };

        let state = Arc::new(PipelineState::new(generation));
        let renderer = Renderer::new(detector.class_names(), self.font.clone());
        let tracker = CentroidTracker::new(self.tracker.clone());
        let runner = PipelineRunner::new(
            source,
            detector,
            tracker,
            renderer,
            state.clone(),
            self.pipeline.clone(),
        );

        let handle = thread::Builder::new()
            .name(format!("pipeline-{}", generation))
            .spawn(move || runner.run())?;

        let mut inner = self.lock();
        inner.state = Some(state);
        inner.worker = Some(handle);
        info!("▶️ 检测已启动 (第 {} 轮)", generation);
        Ok(generation)
    }

    /// 请求停止并等待运行线程退出; 未运行时直接成功
    pub fn stop(&self) -> Result<Option<RunSummary>> {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = {
            let mut inner = self.lock();
            if let Some(state) = &inner.state {
                state.request_stop();
            }
            inner.worker.take()
        };
        match handle {
            Some(handle) => {
                let summary = join_worker(handle)?;
                info!("⏹️ 检测已停止");
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.current_state().map_or(false, |s| s.is_running())
    }

    pub fn source_open(&self) -> bool {
        self.lock()
            .worker
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    /// 最近一轮的统计 (停止后保留)
    pub fn stats(&self) -> PipelineStats {
        self.current_state().map(|s| s.stats()).unwrap_or_default()
    }

    pub fn latest_frame(&self) -> Option<Arc<FramePacket>> {
        self.current_state().and_then(|s| s.latest_frame())
    }

    /// 最新已发布帧, 尚无帧时返回 `NoFrameAvailable`
    pub fn capture_still(&self) -> Result<Arc<FramePacket>> {
        self.latest_frame().ok_or(Error::NoFrameAvailable)
    }

    /// 保存最新帧到目录, 文件名 frame_YYYYMMDD_HHMMSS.jpg
    pub fn save_still(&self, dir: &Path) -> Result<PathBuf> {
        let packet = self.capture_still()?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("frame_{}.jpg", crate::gen_time_string()));
        std::fs::write(&path, &packet.jpeg)?;
        info!("💾 已保存截图: {}", path.display());
        Ok(path)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            timestamp: chrono::Local::now().to_rfc3339(),
            is_processing: self.is_processing(),
            source_open: self.source_open(),
        }
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("⚠️ 停止流水线失败: {}", e);
        }
    }
}

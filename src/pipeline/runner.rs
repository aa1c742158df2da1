// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线运行器 (生产者)
//!
//! 每帧严格顺序执行: 读帧 → 检测 → 跟踪 → 绘制 → JPEG 编码 → 发布 → 统计。
//! 停止标志每轮检查一次, 不打断正在处理的帧。

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::state::{FpsCounter, FramePacket, PipelineState, PipelineStats, TrackSummary};
use crate::detection::{CentroidTracker, ObjectDetector};
use crate::error::Result;
use crate::input::{Frame, FrameSource};
use crate::renderer::Renderer;

/// 运行器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 每帧处理后的固定延时 (毫秒), 0 = 不限速
    pub frame_delay_ms: u64,
    /// JPEG 质量 (1-100)
    pub jpeg_quality: u8,
    /// 每 N 帧输出一次日志
    pub log_every: u64,
    /// 标签字体
    pub font: Option<std::path::PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_delay_ms: 30,
            jpeg_quality: 80,
            log_every: 60,
            font: Some(std::path::PathBuf::from("assets/font/DejaVuSans.ttf")),
        }
    }
}

/// 运行结果摘要
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub frames: u64,
    pub skipped: u64,
    pub tracks_created: u64,
    pub elapsed: Duration,
}

/// RGB 帧 → JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode_image(frame)?;
    Ok(buffer.into_inner())
}

pub struct PipelineRunner<D: ObjectDetector> {
    source: Box<dyn FrameSource>,
    detector: D,
    tracker: CentroidTracker,
    renderer: Renderer,
    state: Arc<PipelineState>,
    config: PipelineConfig,
    fps: FpsCounter,
    frame_count: u64,
    skipped: u64,
    sink: Option<Sender<Arc<FramePacket>>>,
}

impl<D: ObjectDetector> PipelineRunner<D> {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: D,
        tracker: CentroidTracker,
        renderer: Renderer,
        state: Arc<PipelineState>,
        config: PipelineConfig,
    ) -> Self {
        state.set_running(true);
        Self {
            source,
            detector,
            tracker,
            renderer,
            state,
            config,
            fps: FpsCounter::new(),
            frame_count: 0,
            skipped: 0,
            sink: None,
        }
    }

    /// 逐帧输出 (例如写盘线程)
    ///
    /// 与实时槽位不同, 通道满时阻塞等待, 不丢帧; 接收端关闭后不再输出。
    pub fn with_frame_sink(mut self, sink: Sender<Arc<FramePacket>>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    /// 运行直到停止请求、流结束或读帧失败
    pub fn run(mut self) -> RunSummary {
        let started = Instant::now();
        let delay = Duration::from_millis(self.config.frame_delay_ms);
        info!(
            "🚀 流水线启动: {} (检测器: {})",
            self.source.describe(),
            self.detector.name()
        );

        while self.state.is_running() {
            let state = &self.state;
            let frame = match self.source.read_while(&|| state.is_running()) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("🏁 输入结束: {}", self.source.describe());
                    break;
                }
                Err(e) => {
                    warn!("⚠️ 读帧失败, 结束运行: {}", e);
                    break;
                }
            };

            if let Err(e) = self.process(frame) {
                self.skipped += 1;
                warn!("⚠️ 跳过第 {} 帧: {}", self.frame_count + self.skipped, e);
            }

            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }

        self.state.set_running(false);
        let summary = RunSummary {
            frames: self.frame_count,
            skipped: self.skipped,
            tracks_created: self.tracker.issued_count(),
            elapsed: started.elapsed(),
        };
        info!(
            "🛑 流水线停止: 处理 {} 帧, 跳过 {} 帧, 用时 {:.1?}",
            summary.frames, summary.skipped, summary.elapsed
        );
        summary
    }

    /// 单帧处理, 出错时只跳过本帧
    fn process(&mut self, mut frame: Frame) -> Result<()> {
        let detections = self.detector.detect(&frame)?;

        let now = Instant::now();
        let tracks = self.tracker.update(&detections, now);
        let active: Vec<TrackSummary> = tracks
            .values()
            .filter(|t| t.is_active())
            .map(TrackSummary::from)
            .collect();
        let total_objects = tracks.len();

        let fps = self.fps.tick();
        self.renderer.render(&mut frame, tracks);
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.renderer
            .draw_hud(&mut frame, fps, active.len(), &timestamp);

        let evicted = self.tracker.evict_stale(now);
        if evicted > 0 {
            debug!("🧹 清理 {} 条失活轨迹", evicted);
        }

        let jpeg = encode_jpeg(&frame, self.config.jpeg_quality)?;
        self.frame_count += 1;

        let stats = PipelineStats {
            total_objects,
            current_objects: active.len(),
            fps,
            frame_count: self.frame_count,
        };
        let packet = FramePacket {
            generation: self.state.generation(),
            seq: self.frame_count,
            width: frame.width(),
            height: frame.height(),
            jpeg,
            tracks: active,
        };

        if self.config.log_every > 0 && self.frame_count % self.config.log_every == 0 {
            info!(
                "📊 帧 {} | FPS {:.1} | 活跃目标 {} | 轨迹总数 {}",
                stats.frame_count, stats.fps, stats.current_objects, stats.total_objects
            );
        }

        let packet = Arc::new(packet);
        self.state.publish(packet.clone(), stats);

        let disconnected = self
            .sink
            .as_ref()
            .map_or(false, |sink| sink.send(packet).is_err());
        if disconnected {
            warn!("⚠️ 帧输出通道已关闭");
            self.sink = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, Detection};
    use crate::error::Error;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;

    /// 预设帧序列
    struct ScriptedSource {
        frames: VecDeque<Frame>,
        fail_at_end: bool,
    }

    impl ScriptedSource {
        fn new(n: usize, fail_at_end: bool) -> Self {
            Self {
                frames: (0..n).map(|_| RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]))).collect(),
                fail_at_end,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None if self.fail_at_end => Err(Error::frame_read("device lost")),
                None => Ok(None),
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    /// 固定检测结果, 指定调用序号时失败
    struct MockDetector {
        names: Vec<String>,
        calls: usize,
        fail_on: Option<usize>,
    }

    impl MockDetector {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                names: vec!["person".to_string()],
                calls: 0,
                fail_on,
            }
        }
    }

    impl ObjectDetector for MockDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                return Err(Error::inference("mock failure"));
            }
            Ok(vec![Detection::new(
                BBox::new(10.0, 10.0, 20.0, 20.0),
                0.9,
                0,
                "person",
            )])
        }

        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn runner(source: ScriptedSource, detector: MockDetector) -> PipelineRunner<MockDetector> {
        let renderer = Renderer::new(detector.class_names(), None);
        PipelineRunner::new(
            Box::new(source),
            detector,
            CentroidTracker::default(),
            renderer,
            Arc::new(PipelineState::new(7)),
            PipelineConfig {
                frame_delay_ms: 0,
                font: None,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_runs_to_end_of_stream() {
        let runner = runner(ScriptedSource::new(5, false), MockDetector::new(None));
        let state = runner.state().clone();
        let summary = runner.run();

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.tracks_created, 1);
        assert!(!state.is_running());

        let stats = state.stats();
        assert_eq!(stats.frame_count, 5);
        assert_eq!(stats.current_objects, 1);
        assert_eq!(stats.total_objects, 1);

        let packet = state.latest_frame().unwrap();
        assert_eq!(packet.generation, 7);
        assert_eq!(packet.seq, 5);
        assert_eq!((packet.width, packet.height), (64, 48));
        assert_eq!(&packet.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(packet.tracks.len(), 1);
        assert_eq!(packet.tracks[0].id, 1);
    }

    #[test]
    fn test_read_error_ends_run() {
        let summary = runner(ScriptedSource::new(2, true), MockDetector::new(None)).run();
        assert_eq!(summary.frames, 2);
    }

    #[test]
    fn test_detect_error_skips_frame() {
        let runner = runner(ScriptedSource::new(4, false), MockDetector::new(Some(2)));
        let state = runner.state().clone();
        let summary = runner.run();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(state.stats().frame_count, 3);
    }

    #[test]
    fn test_frame_sink_receives_packets() {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let summary = runner(ScriptedSource::new(3, false), MockDetector::new(None))
            .with_frame_sink(tx)
            .run();
        assert_eq!(summary.frames, 3);
        let seqs: Vec<u64> = rx.try_iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_slow_frame_sink_gets_every_frame() {
        let (tx, rx) = crossbeam_channel::bounded::<Arc<FramePacket>>(2);
        let writer = std::thread::spawn(move || {
            let mut seqs = Vec::new();
            for packet in rx {
                std::thread::sleep(std::time::Duration::from_millis(2));
                seqs.push(packet.seq);
            }
            seqs
        });
        let summary = runner(ScriptedSource::new(40, false), MockDetector::new(None))
            .with_frame_sink(tx)
            .run();
        let seqs = writer.join().unwrap();
        assert_eq!(summary.frames, 40);
        assert_eq!(seqs, (1..=40).collect::<Vec<u64>>());
    }

    #[test]
    fn test_closed_frame_sink_does_not_stop_run() {
        let (tx, rx) = crossbeam_channel::bounded::<Arc<FramePacket>>(1);
        drop(rx);
        let summary = runner(ScriptedSource::new(3, false), MockDetector::new(None))
            .with_frame_sink(tx)
            .run();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_encode_jpeg() {
        let frame = RgbImage::from_pixel(16, 16, Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&frame, 80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 控制器端到端测试: 模拟输入 + 模拟检测器

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;
use yolo_tracker::input::ChannelSource;
use yolo_tracker::pipeline::FramePacket;
use yolo_tracker::{
    AppConfig, BBox, Detection, Error, Frame, FrameSource, ObjectDetector, PipelineController,
    Result,
};

/// 有限帧输入
struct FiniteSource {
    remaining: usize,
}

impl FrameSource for FiniteSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(RgbImage::new(160, 120)))
    }

    fn describe(&self) -> String {
        "finite".to_string()
    }
}

/// 无限帧输入, 直到外部放行
struct EndlessSource {
    released: Arc<AtomicBool>,
}

impl FrameSource for EndlessSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(2));
        Ok(Some(RgbImage::new(160, 120)))
    }

    fn describe(&self) -> String {
        "endless".to_string()
    }
}

/// 每帧一个向右移动的目标
struct MovingBox {
    names: Vec<String>,
    step: f32,
    calls: usize,
}

impl MovingBox {
    fn new() -> Self {
        Self {
            names: vec!["person".to_string()],
            step: 5.0,
            calls: 0,
        }
    }
}

impl ObjectDetector for MovingBox {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let x = 10.0 + self.step * self.calls as f32;
        self.calls += 1;
        Ok(vec![Detection::new(
            BBox::new(x, 30.0, 20.0, 40.0),
            0.8,
            0,
            "person",
        )])
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn name(&self) -> &str {
        "moving-box"
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.frame_delay_ms = 0;
    config.pipeline.font = None;
    config
}

fn wait_until_idle(controller: &PipelineController) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while controller.is_processing() {
        assert!(Instant::now() < deadline, "pipeline did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

/// 等待指定代数发布首帧
fn wait_for_frame(controller: &PipelineController, generation: u64) -> Arc<FramePacket> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(frame) = controller.latest_frame() {
            if frame.generation == generation && !frame.tracks.is_empty() {
                return frame;
            }
        }
        assert!(Instant::now() < deadline, "no frame published");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_finite_source_runs_to_completion() {
    let controller = PipelineController::new(&test_config());
    let generation = controller
        .start_with(Box::new(FiniteSource { remaining: 12 }), MovingBox::new())
        .unwrap();
    assert_eq!(generation, 1);
    wait_until_idle(&controller);

    let summary = controller.stop().unwrap().unwrap();
    assert_eq!(summary.frames, 12);
    assert_eq!(summary.skipped, 0);
    // 每帧只移动 5px, 始终是同一条轨迹
    assert_eq!(summary.tracks_created, 1);

    let stats = controller.stats();
    assert_eq!(stats.frame_count, 12);
    assert_eq!(stats.total_objects, 1);
    assert_eq!(stats.current_objects, 1);

    let frame = controller.latest_frame().unwrap();
    assert_eq!(frame.generation, 1);
    assert_eq!((frame.width, frame.height), (160, 120));
    assert_eq!(frame.tracks.len(), 1);
    assert_eq!(frame.tracks[0].id, 1);
    assert_eq!(frame.tracks[0].class_name, "person");
    assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_restart_resets_track_ids() {
    let controller = PipelineController::new(&test_config());
    controller
        .start_with(Box::new(FiniteSource { remaining: 3 }), MovingBox::new())
        .unwrap();
    wait_until_idle(&controller);

    let generation = controller
        .start_with(Box::new(FiniteSource { remaining: 3 }), MovingBox::new())
        .unwrap();
    assert_eq!(generation, 2);
    wait_until_idle(&controller);

    let frame = controller.latest_frame().unwrap();
    assert_eq!(frame.generation, 2);
    assert_eq!(frame.tracks[0].id, 1);
    assert_eq!(controller.stats().total_objects, 1);
}

#[test]
fn test_capture_before_any_frame() {
    let controller = PipelineController::new(&test_config());
    assert!(matches!(controller.capture_still(), Err(Error::NoFrameAvailable)));
    assert!(controller.latest_frame().is_none());
    assert_eq!(controller.stats().frame_count, 0);

    let health = controller.health();
    assert_eq!(health.status, "healthy");
    assert!(!health.is_processing);
    assert!(!health.source_open);
}

#[test]
fn test_stop_is_idempotent() {
    let controller = PipelineController::new(&test_config());
    assert!(controller.stop().unwrap().is_none());

    let released = Arc::new(AtomicBool::new(false));
    controller
        .start_with(
            Box::new(EndlessSource {
                released: released.clone(),
            }),
            MovingBox::new(),
        )
        .unwrap();
    assert!(controller.is_processing());

    // 运行中再次启动被拒绝
    let again = controller.start_with(Box::new(FiniteSource { remaining: 1 }), MovingBox::new());
    assert!(matches!(again, Err(Error::AlreadyRunning)));

    assert!(controller.stop().unwrap().is_some());
    assert!(!controller.is_processing());
    assert!(controller.stop().unwrap().is_none());
    released.store(true, Ordering::SeqCst);
}

#[test]
fn test_save_still_writes_jpeg() {
    let controller = PipelineController::new(&test_config());
    controller
        .start_with(Box::new(FiniteSource { remaining: 2 }), MovingBox::new())
        .unwrap();
    wait_until_idle(&controller);

    let dir = std::env::temp_dir().join(format!("yolo_tracker_still_{}", std::process::id()));
    let path = controller.save_still(&dir).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("frame_") && name.ends_with(".jpg"));
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_stop_mid_stream_then_restart_resets_ids() {
    let controller = PipelineController::new(&test_config());
    let released = Arc::new(AtomicBool::new(false));

    controller
        .start_with(
            Box::new(EndlessSource {
                released: released.clone(),
            }),
            MovingBox::new(),
        )
        .unwrap();
    let first = wait_for_frame(&controller, 1);
    assert_eq!(first.tracks[0].id, 1);

    // 帧仍在持续产生时停止
    let summary = controller.stop().unwrap().unwrap();
    assert!(summary.frames >= 1);
    assert!(!controller.is_processing());

    let generation = controller
        .start_with(
            Box::new(EndlessSource {
                released: released.clone(),
            }),
            MovingBox::new(),
        )
        .unwrap();
    assert_eq!(generation, 2);

    let frame = wait_for_frame(&controller, 2);
    assert_eq!(frame.generation, 2);
    assert_eq!(frame.tracks[0].id, 1);

    controller.stop().unwrap();
    released.store(true, Ordering::SeqCst);
}

#[test]
fn test_stop_returns_while_source_is_stalled() {
    let controller = PipelineController::new(&test_config());

    // 发送端保持打开但从不发送: 模拟卡住的实时流
    let (_tx, rx) = crossbeam_channel::bounded::<Frame>(1);
    let source = ChannelSource::new(rx, "stalled feed")
        .with_timeouts(Duration::from_millis(5), Duration::from_secs(60));
    controller.start_with(Box::new(source), MovingBox::new()).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert!(controller.is_processing());

    let started = Instant::now();
    let summary = controller.stop().unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(summary.frames, 0);

    // 停止后可以立即重新启动
    let generation = controller
        .start_with(Box::new(FiniteSource { remaining: 1 }), MovingBox::new())
        .unwrap();
    assert_eq!(generation, 2);
    wait_until_idle(&controller);
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use mimalloc::MiMalloc;
use tracing::{info, warn};

use yolo_tracker::pipeline::FramePacket;
use yolo_tracker::renderer::load_font;
use yolo_tracker::{
    open_source, AppConfig, CentroidTracker, Detector, ObjectDetector, PipelineRunner,
    PipelineState, Renderer, SourceDescriptor,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 直接播放处理: 读取输入 → 检测 → 跟踪 → 绘制, 可选逐帧写出 JPEG
///
/// 直接运行: cargo run --bin track --release -- --source ./frames --output ./out
#[derive(Parser, Debug)]
#[command(author, version, about = "YOLOv8 目标检测与跟踪", long_about = None)]
struct Args {
    /// 输入: 摄像头序号 / 视频文件 / 图片目录 / 图片 / rtsp:// http:// 地址
    #[arg(short, long, default_value = "0")]
    source: String,

    /// 输出目录 (逐帧写出 frame_000001.jpg ...)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 配置文件
    #[arg(short, long, default_value = "tracker_config.json")]
    config: PathBuf,

    /// ONNX 模型路径
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// 类别名称文件
    #[arg(long)]
    names: Option<PathBuf>,

    /// 置信度阈值
    #[arg(long)]
    confidence: Option<f32>,

    /// NMS IoU 阈值
    #[arg(long)]
    nms: Option<f32>,

    /// 帧间延时 (毫秒), 缺省使用配置文件中的值
    #[arg(long)]
    delay_ms: Option<u64>,

    /// 使用 CUDA
    #[arg(long)]
    cuda: bool,
}

/// 写盘线程: 有界通道, 满时运行器等待, 每帧都会写出
fn spawn_writer(
    dir: PathBuf,
) -> Result<(crossbeam_channel::Sender<Arc<FramePacket>>, thread::JoinHandle<usize>)> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    let (tx, rx) = bounded::<Arc<FramePacket>>(32);
    let handle = thread::Builder::new()
        .name("frame-writer".to_string())
        .spawn(move || {
            let mut written = 0;
            for packet in rx {
                let path = dir.join(format!("frame_{:06}.jpg", packet.seq));
                match std::fs::write(&path, &packet.jpeg) {
                    Ok(()) => written += 1,
                    Err(e) => warn!("❌ 写出失败 {}: {}", path.display(), e),
                }
            }
            written
        })?;
    Ok((tx, handle))
}

/// 命令行参数覆盖配置文件 (只覆盖显式给出的项)
fn apply_overrides(args: &Args, config: &mut AppConfig) {
    if let Some(model) = &args.model {
        config.detector.model = model.clone();
    }
    if let Some(names) = &args.names {
        config.detector.names = Some(names.clone());
    }
    if let Some(confidence) = args.confidence {
        config.detector.confidence = confidence;
    }
    if let Some(nms) = args.nms {
        config.detector.nms = nms;
    }
    config.detector.cuda |= args.cuda;
    if let Some(delay) = args.delay_ms {
        config.pipeline.frame_delay_ms = delay;
    }
}

fn main() -> Result<()> {
    yolo_tracker::init_tracing();
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config);
    apply_overrides(&args, &mut config);
    config.print_summary();

    let desc: SourceDescriptor = args.source.parse()?;
    let source = open_source(&desc).with_context(|| format!("cannot open {}", desc))?;

    let detector = Detector::new(&config.detector);
    let font = load_font(config.pipeline.font.as_deref());
    let renderer = Renderer::new(detector.class_names(), font);
    let tracker = CentroidTracker::new(config.tracker.clone());
    let state = Arc::new(PipelineState::new(1));

    let mut runner = PipelineRunner::new(
        source,
        detector,
        tracker,
        renderer,
        state.clone(),
        config.pipeline.clone(),
    );

    let writer = match args.output {
        Some(dir) => {
            let (tx, handle) = spawn_writer(dir.clone())?;
            runner = runner.with_frame_sink(tx);
            info!("💾 输出目录: {}", dir.display());
            Some(handle)
        }
        None => None,
    };

    let summary = runner.run();

    if let Some(handle) = writer {
        let written = handle
            .join()
            .map_err(|_| anyhow::anyhow!("frame writer panicked"))?;
        info!("💾 已写出 {} 帧", written);
    }

    let stats = state.stats();
    info!(
        "✅ 处理完成: {} 帧 ({} 跳过), 轨迹总数 {}, 最终 FPS {:.1}",
        summary.frames, summary.skipped, summary.tracks_created, stats.fps
    );
    Ok(())
}

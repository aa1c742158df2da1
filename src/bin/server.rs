// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;

use yolo_tracker::{server, AppConfig, PipelineController};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Web 实时流服务: 浏览器控制启动/停止, MJPEG 实时画面
///
/// 直接运行: cargo run --bin server --release -- --port 5020
#[derive(Parser, Debug)]
#[command(author, version, about = "YOLOv8 实时检测流服务", long_about = None)]
struct Args {
    /// 配置文件
    #[arg(short, long, default_value = "tracker_config.json")]
    config: PathBuf,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// ONNX 模型路径
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// 截图保存目录
    #[arg(long)]
    capture_dir: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    yolo_tracker::init_tracing();
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config);
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model) = args.model {
        config.detector.model = model;
    }
    if let Some(dir) = args.capture_dir {
        config.server.capture_dir = dir;
    }
    config.print_summary();

    let controller = Arc::new(PipelineController::new(&config));
    server::serve(controller.clone(), config.server.clone()).await?;

    info!("👋 服务退出, 停止流水线");
    controller.stop()?;
    Ok(())
}

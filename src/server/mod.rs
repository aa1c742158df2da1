// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 实时流服务 (消费者)
//!
//! | 路由                 | 说明                                   |
//! |----------------------|----------------------------------------|
//! | GET  /               | 控制页面                               |
//! | GET  /video_feed     | MJPEG 连续流                           |
//! | POST /start_detection| 启动流水线 {source, confidence, nms}   |
//! | POST /stop_detection | 停止流水线                             |
//! | GET  /get_stats      | 统计                                   |
//! | GET  /frame.jpg      | 最新帧                                 |
//! | GET  /detections     | 最新帧的活跃轨迹                       |
//! | POST /save_frame     | 保存最新帧到截图目录                   |
//! | GET  /health         | 健康检查                               |
//!
//! 每个流连接独立轮询最新帧槽位, 只发送新帧; 慢连接会跳帧, 但不会乱序。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::http::{header, StatusCode};
use actix_web::web::{self, Bytes};
use actix_web::{App, HttpResponse, HttpServer, ResponseError};
use async_stream::stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::error::Error;
use crate::pipeline::PipelineController;

const INDEX_HTML: &str = include_str!("index.html");

/// 服务参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 流连接轮询间隔 (毫秒)
    pub poll_interval_ms: u64,
    /// 截图保存目录
    pub capture_dir: PathBuf,
    /// start 请求未指定 source 时使用
    pub default_source: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5020,
            poll_interval_ms: 33,
            capture_dir: PathBuf::from("captures"),
            default_source: "0".to_string(),
        }
    }
}

pub struct AppState {
    pub controller: Arc<PipelineController>,
    pub config: ServerConfig,
}

/// 输入源参数: 摄像头序号或路径/URL
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SourceParam {
    Index(u64),
    Text(String),
}

impl SourceParam {
    fn descriptor(&self) -> String {
        match self {
            SourceParam::Index(i) => i.to_string(),
            SourceParam::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub source: Option<SourceParam>,
    pub confidence: Option<f32>,
    pub nms: Option<f32>,
}

impl StartRequest {
    /// 空请求体使用默认值; 非空但无法解析时报错, 不会悄悄启动默认输入
    pub fn from_body(body: &[u8]) -> Result<Self, Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| Error::invalid_request(e.to_string()))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NoFrameAvailable => StatusCode::NOT_FOUND,
            Error::AlreadyRunning => StatusCode::CONFLICT,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

fn blocking_error(e: actix_web::error::BlockingError) -> Error {
    Error::worker(e.to_string())
}

/// multipart 分段
fn mjpeg_chunk(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn video_feed(state: web::Data<AppState>) -> HttpResponse {
    let controller = state.controller.clone();
    let poll = Duration::from_millis(state.config.poll_interval_ms.max(1));
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(poll);
        let mut last: Option<(u64, u64)> = None;
        loop {
            interval.tick().await;
            let Some(packet) = controller.latest_frame() else {
                continue;
            };
            let key = (packet.generation, packet.seq);
            if last == Some(key) {
                continue;
            }
            last = Some(key);
            yield Ok::<Bytes, actix_web::Error>(mjpeg_chunk(&packet.jpeg));
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
        .streaming(stream)
}

async fn start_detection(
    state: web::Data<AppState>,
    body: Bytes,
) -> Result<HttpResponse, Error> {
    let request = StartRequest::from_body(&body)?;
    let source = request
        .source
        .as_ref()
        .map(SourceParam::descriptor)
        .unwrap_or_else(|| state.config.default_source.clone());

    let controller = state.controller.clone();
    let (confidence, nms) = (request.confidence, request.nms);
    let started = source.clone();
    let generation = web::block(move || controller.start(&started, confidence, nms))
        .await
        .map_err(blocking_error)?
        .inspect_err(|e| error!("❌ 启动失败 ({}): {}", source, e))?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Detection started",
        "source": source,
        "generation": generation,
    })))
}

async fn stop_detection(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let controller = state.controller.clone();
    web::block(move || controller.stop())
        .await
        .map_err(blocking_error)??;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Detection stopped",
    })))
}

async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.controller.stats())
}

async fn frame_handler(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let packet = state.controller.capture_still()?;
    Ok(HttpResponse::Ok()
        .content_type("image/jpeg")
        .append_header(("Cache-Control", "no-cache"))
        .body(packet.jpeg.clone()))
}

async fn detections_handler(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let packet = state.controller.capture_still()?;
    Ok(HttpResponse::Ok().json(json!({
        "generation": packet.generation,
        "frame": packet.seq,
        "tracks": &packet.tracks,
    })))
}

async fn save_frame(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let controller = state.controller.clone();
    let dir = state.config.capture_dir.clone();
    match web::block(move || controller.save_still(&dir))
        .await
        .map_err(blocking_error)?
    {
        Ok(path) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok(HttpResponse::Ok().json(json!({
                "status": "success",
                "filename": filename,
            })))
        }
        Err(Error::NoFrameAvailable) => Ok(HttpResponse::BadRequest()
            .json(json!({ "error": Error::NoFrameAvailable.to_string() }))),
        Err(e) => Err(e),
    }
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.controller.health())
}

/// 注册全部路由
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video_feed", web::get().to(video_feed))
        .route("/start_detection", web::post().to(start_detection))
        .route("/stop_detection", web::post().to(stop_detection))
        .route("/get_stats", web::get().to(get_stats))
        .route("/frame.jpg", web::get().to(frame_handler))
        .route("/detections", web::get().to(detections_handler))
        .route("/save_frame", web::post().to(save_frame))
        .route("/health", web::get().to(health));
}

/// 启动 HTTP 服务直到进程退出
pub async fn serve(controller: Arc<PipelineController>, config: ServerConfig) -> std::io::Result<()> {
    let addr = (config.host.clone(), config.port);
    let state = web::Data::new(AppState { controller, config });

    info!("🌐 服务启动: http://{}:{}", addr.0, addr.1);
    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(addr)?
        .run()
        .await
}

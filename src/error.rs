// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型
//! Error taxonomy for the detection / tracking pipeline

use thiserror::Error;

/// Result type alias for the pipeline library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// 摄像头/文件无法打开, start 请求直接失败
    #[error("Video source unavailable: {0}")]
    SourceUnavailable(String),

    /// 主检测后端初始化失败 (由 Detector 内部消化并回退)
    #[error("Detector backend init failed: {0}")]
    BackendInit(String),

    /// 运行中读帧失败, 视为流结束
    #[error("Frame read failed: {0}")]
    FrameRead(String),

    #[error("Malformed frame: {width}x{height}")]
    MalformedFrame { width: u32, height: u32 },

    #[error("Inference failed: {0}")]
    Inference(String),

    /// 尚未发布任何帧
    #[error("No frame available")]
    NoFrameAvailable,

    /// 请求参数无法解析
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Pipeline already running")]
    AlreadyRunning,

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Image error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn source_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn backend_init<S: Into<String>>(msg: S) -> Self {
        Self::BackendInit(msg.into())
    }

    pub fn frame_read<S: Into<String>>(msg: S) -> Self {
        Self::FrameRead(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn worker<S: Into<String>>(msg: S) -> Self {
        Self::Worker(msg.into())
    }
}

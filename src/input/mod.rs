// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// - SourceDescriptor: 输入描述解析 (摄像头序号 / 流地址 / 图片目录 / 图片 / 视频文件)
/// - ImageSequenceSource: 图片目录或单张图片
/// - ChannelSource: 解码线程经通道推送的帧 (可中断读取)
/// - FfmpegSource: 摄像头、视频文件、RTSP/HTTP 流 (`ffmpeg` 特性)
pub mod channel;
pub mod image_seq;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbImage;

use crate::error::{Error, Result};

pub use channel::ChannelSource;
pub use image_seq::ImageSequenceSource;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSource;

/// 已解码帧 (RGB8)
pub type Frame = RgbImage;

/// 帧来源
///
/// `Ok(Some(frame))` 为下一帧, `Ok(None)` 为流结束, `Err` 为设备错误。
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>>;

    /// 可中断读取: `running()` 变为 false 时实时源应尽快返回 `Ok(None)`
    ///
    /// 文件类输入不会长时间阻塞, 默认直接调用 `read`。
    fn read_while(&mut self, running: &dyn Fn() -> bool) -> Result<Option<Frame>> {
        let _ = running;
        self.read()
    }

    /// 描述信息 (日志用)
    fn describe(&self) -> String;
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 输入描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// 本地摄像头序号
    Camera(usize),
    /// rtsp:// rtmp:// http(s):// 网络流
    Stream(String),
    /// 图片目录 (按文件名排序播放)
    ImageDir(PathBuf),
    /// 单张图片
    Image(PathBuf),
    /// 视频文件
    Video(PathBuf),
}

impl FromStr for SourceDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::source_unavailable("empty source descriptor"));
        }
        if let Ok(index) = s.parse::<usize>() {
            return Ok(SourceDescriptor::Camera(index));
        }
        let lower = s.to_ascii_lowercase();
        if ["rtsp://", "rtmp://", "http://", "https://"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
        {
            return Ok(SourceDescriptor::Stream(s.to_string()));
        }

        let path = PathBuf::from(s);
        if path.is_dir() {
            Ok(SourceDescriptor::ImageDir(path))
        } else if is_image_path(&path) {
            Ok(SourceDescriptor::Image(path))
        } else {
            Ok(SourceDescriptor::Video(path))
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Camera(i) => write!(f, "camera #{}", i),
            SourceDescriptor::Stream(url) => write!(f, "stream {}", url),
            SourceDescriptor::ImageDir(p) => write!(f, "image dir {}", p.display()),
            SourceDescriptor::Image(p) => write!(f, "image {}", p.display()),
            SourceDescriptor::Video(p) => write!(f, "video {}", p.display()),
        }
    }
}

/// 打开输入, 失败返回 `SourceUnavailable`
pub fn open_source(desc: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
    match desc {
        SourceDescriptor::ImageDir(dir) => Ok(Box::new(ImageSequenceSource::from_dir(dir)?)),
        SourceDescriptor::Image(path) => Ok(Box::new(ImageSequenceSource::from_file(path)?)),
        SourceDescriptor::Video(path) if !path.exists() => Err(Error::source_unavailable(format!(
            "file not found: {}",
            path.display()
        ))),
        _ => open_ffmpeg(desc),
    }
}

#[cfg(feature = "ffmpeg")]
fn open_ffmpeg(desc: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegSource::open(desc)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_ffmpeg(desc: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
    Err(Error::source_unavailable(format!(
        "{} requires the `ffmpeg` feature",
        desc
    )))
}

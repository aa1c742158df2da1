// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! FFmpeg 输入 (`ffmpeg` 特性)
//! 摄像头 / 视频文件 / RTSP·HTTP 流 → RGB 帧
//!
//! 解码在独立线程中运行, 帧经有界通道交给运行器; 运行器丢弃接收端后解码线程随之退出。
//! 读取可被停止请求打断, 断流超时视为读帧失败 (见 `ChannelSource`)。

use std::thread;

use crossbeam_channel::{bounded, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use tracing::{debug, info, warn};

use super::{ChannelSource, Frame, FrameSource, SourceDescriptor};
use crate::error::{Error, Result};

/// 解码缓冲帧数
const CHANNEL_CAPACITY: usize = 4;

/// 解码过滤器: rgb24 帧 → RgbImage → 通道
#[derive(Clone)]
struct RgbFrameFilter {
    tx: Sender<Frame>,
    dropped: usize,
}

impl FrameFilter for RgbFrameFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: ez_ffmpeg::Frame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<ez_ffmpeg::Frame>, String> {
        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped += 1;
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width as u32;
            let h = (*frame.as_ptr()).height as u32;
            let data = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0] as usize;
            let row_bytes = w as usize * 3;

            if w == 0 || h == 0 || data.is_null() || stride < row_bytes {
                self.dropped += 1;
                return Ok(None);
            }

            let mut buffer = Vec::with_capacity(row_bytes * h as usize);
            for row in 0..h as usize {
                let src = std::slice::from_raw_parts(data.add(row * stride), row_bytes);
                buffer.extend_from_slice(src);
            }

            let Some(image) = Frame::from_raw(w, h, buffer) else {
                self.dropped += 1;
                return Ok(None);
            };

            // 接收端已关闭 → 停止解码
            if self.tx.send(image).is_err() {
                return Err("frame receiver closed".to_string());
            }
        }
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        if self.dropped > 0 {
            warn!("⚠️ 解码结束, 丢弃 {} 个无效帧", self.dropped);
        }
    }
}

/// 摄像头设备名 (按平台)
fn camera_input(index: usize) -> (String, &'static str) {
    #[cfg(target_os = "windows")]
    {
        (format!("video={}", index), "dshow")
    }
    #[cfg(target_os = "macos")]
    {
        (format!("{}", index), "avfoundation")
    }
    #[cfg(target_os = "linux")]
    {
        (format!("/dev/video{}", index), "v4l2")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        (format!("{}", index), "video4linux2")
    }
}

fn build_input(desc: &SourceDescriptor) -> Result<Input> {
    let input = match desc {
        SourceDescriptor::Camera(index) => {
            let (url, format) = camera_input(*index);
            Input::new(url).set_format(format)
        }
        SourceDescriptor::Stream(url) if url.to_ascii_lowercase().starts_with("rtsp://") => {
            Input::new(url.as_str()).set_input_opts(
                [("rtsp_transport", "tcp"), ("rtsp_flags", "prefer_tcp")].into(),
            )
        }
        SourceDescriptor::Stream(url) => Input::new(url.as_str()),
        SourceDescriptor::Video(path) => Input::new(path.to_string_lossy().to_string()),
        other => {
            return Err(Error::source_unavailable(format!(
                "{} is not an ffmpeg source",
                other
            )))
        }
    };
    Ok(input)
}

pub struct FfmpegSource {
    frames: ChannelSource,
}

impl FfmpegSource {
    /// 启动解码线程, 等待 FFmpeg 打开输入后返回
    pub fn open(desc: &SourceDescriptor) -> Result<Self> {
        let input = build_input(desc)?;
        let label = desc.to_string();
        let (tx, rx) = bounded::<Frame>(CHANNEL_CAPACITY);
        let (init_tx, init_rx) = bounded::<std::result::Result<(), String>>(1);

        let thread_label = label.clone();
        thread::Builder::new()
            .name("ffmpeg-decode".to_string())
            .spawn(move || {
                let filter = RgbFrameFilter { tx, dropped: 0 };
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("rgb", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                let ctx = match FfmpegContext::builder()
                    .input(input)
                    .filter_descs(["format=rgb24"].into())
                    .output(out)
                    .build()
                {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        let _ = init_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let sch = match ctx.start() {
                    Ok(sch) => sch,
                    Err(e) => {
                        let _ = init_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));
                let _ = sch.wait();
                info!("📹 解码循环结束: {}", thread_label);
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => {
                info!("📹 输入已打开: {}", label);
                Ok(Self {
                    frames: ChannelSource::new(rx, label),
                })
            }
            Ok(Err(reason)) => Err(Error::source_unavailable(format!("{}: {}", label, reason))),
            Err(_) => Err(Error::source_unavailable(format!(
                "{}: decoder thread exited",
                label
            ))),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        self.frames.read()
    }

    fn read_while(&mut self, running: &dyn Fn() -> bool) -> Result<Option<Frame>> {
        self.frames.read_while(running)
    }

    fn describe(&self) -> String {
        self.frames.describe()
    }
}

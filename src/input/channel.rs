// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 通道帧源: 解码线程推送, 运行器拉取
//!
//! 按 `poll` 间隔等待新帧, 每次等待之间检查运行标志; 连续 `stall` 时间没有新帧
//! 视为读帧失败 (实时流断开但未关闭连接)。

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::{Frame, FrameSource};
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChannelSource {
    rx: Receiver<Frame>,
    label: String,
    poll: Duration,
    stall: Duration,
}

impl ChannelSource {
    pub fn new<S: Into<String>>(rx: Receiver<Frame>, label: S) -> Self {
        Self {
            rx,
            label: label.into(),
            poll: POLL_INTERVAL,
            stall: STALL_TIMEOUT,
        }
    }

    /// 调整等待间隔与断流判定时间
    pub fn with_timeouts(mut self, poll: Duration, stall: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self.stall = stall;
        self
    }
}

impl FrameSource for ChannelSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        self.read_while(&|| true)
    }

    fn read_while(&mut self, running: &dyn Fn() -> bool) -> Result<Option<Frame>> {
        let started = Instant::now();
        loop {
            if !running() {
                return Ok(None);
            }
            match self.rx.recv_timeout(self.poll) {
                Ok(frame) => return Ok(Some(frame)),
                // 发送端断开 = 解码结束
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
                Err(RecvTimeoutError::Timeout) if started.elapsed() >= self.stall => {
                    return Err(Error::frame_read(format!(
                        "{}: no frame for {:.1?}",
                        self.label, self.stall
                    )))
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

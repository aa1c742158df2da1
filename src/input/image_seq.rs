// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片序列输入 (目录 / 单张图片)

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{is_image_path, Frame, FrameSource};
use crate::error::{Error, Result};

pub struct ImageSequenceSource {
    frames: VecDeque<PathBuf>,
    label: String,
}

impl ImageSequenceSource {
    /// 目录内图片按文件名排序
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::source_unavailable(format!("cannot read {}: {}", dir.display(), e))
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_path(p))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(Error::source_unavailable(format!(
                "no images found in {}",
                dir.display()
            )));
        }
        info!("🖼️ 图片序列: {} ({} 帧)", dir.display(), frames.len());

        Ok(Self {
            frames: frames.into(),
            label: dir.display().to_string(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::source_unavailable(format!(
                "file not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            frames: VecDeque::from([path.to_path_buf()]),
            label: path.display().to_string(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.frames.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .map_err(|e| Error::frame_read(format!("{}: {}", path.display(), e)))?;
        Ok(Some(image.to_rgb8()))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

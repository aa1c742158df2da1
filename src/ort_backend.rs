// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ONNX Runtime 推理引擎封装 (`onnx` 特性)

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info, warn};

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    /// (height, width)
    pub image_size: (u32, u32),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    height: u32,
    width: u32,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let session = match config.ep {
            OrtEP::CUDA(device_id) => match Self::session(&config, Some(device_id)) {
                Ok(s) => s,
                Err(e) => {
                    warn!("⚠️ CUDA 初始化失败, 回退到 CPU: {:#}", e);
                    Self::session(&config, None)?
                }
            },
            OrtEP::CPU => Self::session(&config, None)?,
        };

        let (height, width) = config.image_size;
        info!(
            "🧠 ONNX 会话就绪: {} ({:?}, {}x{})",
            config.f.display(),
            config.ep,
            width,
            height
        );

        Ok(Self {
            session,
            ep: config.ep,
            height,
            width,
        })
    }

    fn session(config: &OrtConfig, cuda_device: Option<i32>) -> Result<Session> {
        let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        if let Some(device_id) = cuda_device {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])?;
        }
        builder
            .commit_from_file(&config.f)
            .with_context(|| format!("Failed to load ONNX model {}", config.f.display()))
    }

    /// 执行推理, 返回所有输出张量
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let input_tensor = Tensor::from_array(xs)?;
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .context("Inference failed")?;

        let mut ys = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let y = outputs[i]
                .try_extract_array::<f32>()
                .context("Failed to extract output")?
                .into_owned();
            ys.push(y);
        }
        if profile {
            debug!("[Model Inference]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型
// 包含: 模型加载、预处理、推理、后处理

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{s, Array, Axis, IxDyn};
use tracing::info;

use crate::detection::{BBox, Detection, DetectorConfig};
use crate::error::Error;
use crate::non_max_suppression;

#[cfg(feature = "onnx")]
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

const CXYWH_OFFSET: usize = 4;

/// YOLOv8 后处理器 (与推理引擎无关)
///
/// 输入张量形状 `[1, 4 + nc, anchors]`, 每列为 `cx, cy, w, h, cls_0..cls_nc`
#[derive(Clone, Debug)]
pub struct YOLOv8Postprocessor {
    pub conf: f32,
    pub iou: f32,
    pub names: Vec<String>,
}

impl YOLOv8Postprocessor {
    pub fn new(conf: f32, iou: f32, names: Vec<String>) -> Self {
        Self { conf, iou, names }
    }

    fn class_name(&self, id: usize) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", id))
    }

    /// 原始输出 → 检测结果 (置信度过滤 → 坐标还原 → NMS)
    pub fn postprocess(
        &self,
        preds: &Array<f32, IxDyn>,
        ratio: f32,
        original_wh: (u32, u32),
    ) -> Result<Vec<Detection>> {
        if preds.ndim() != 3 || preds.shape()[0] < 1 || preds.shape()[1] <= CXYWH_OFFSET {
            bail!("unexpected YOLOv8 output shape {:?}", preds.shape());
        }
        if ratio <= 0.0 {
            bail!("invalid letterbox ratio {}", ratio);
        }
        let nc = preds.shape()[1] - CXYWH_OFFSET;
        let width_original = original_wh.0 as f32;
        let height_original = original_wh.1 as f32;

        let anchor = preds.index_axis(Axis(0), 0);
        let mut data: Vec<Detection> = Vec::new();
        for pred in anchor.axis_iter(Axis(1)) {
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

            let Some((id, &confidence)) = clss
                .into_iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            else {
                continue;
            };

            if confidence < self.conf {
                continue;
            }

            let cx = bbox[0] / ratio;
            let cy = bbox[1] / ratio;
            let w = bbox[2] / ratio;
            let h = bbox[3] / ratio;
            let x = (cx - w / 2.).max(0.0f32).min(width_original);
            let y = (cy - h / 2.).max(0.0f32).min(height_original);
            let w = w.min(width_original - x);
            let h = h.min(height_original - y);

            data.push(Detection::new(
                BBox::new(x, y, w, h),
                confidence,
                id,
                self.class_name(id),
            ));
        }

        non_max_suppression(&mut data, self.iou);
        Ok(data)
    }
}

/// YOLOv8 完整模型结构
pub struct YOLOv8 {
    #[cfg(feature = "onnx")]
    engine: OrtBackend,
    postprocessor: YOLOv8Postprocessor,
    height: u32,
    width: u32,
    profile: bool,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型, 模型文件缺失或加载失败返回 `BackendInit`
    pub fn new(config: &DetectorConfig) -> crate::Result<Self> {
        if !config.model.exists() {
            return Err(Error::backend_init(format!(
                "model file not found: {}",
                config.model.display()
            )));
        }
        let names = crate::models::class_names_or_coco(config.names.as_deref());
        let postprocessor = YOLOv8Postprocessor::new(config.confidence, config.nms, names);
        Self::with_engine(config, postprocessor)
    }

    #[cfg(feature = "onnx")]
    fn with_engine(
        config: &DetectorConfig,
        postprocessor: YOLOv8Postprocessor,
    ) -> crate::Result<Self> {
        let ep = if config.cuda {
            OrtEP::CUDA(config.device_id)
        } else {
            OrtEP::CPU
        };
        let engine = OrtBackend::build(OrtConfig {
            f: config.model.clone(),
            ep,
            image_size: (config.input_size, config.input_size),
        })
        .map_err(|e| Error::backend_init(format!("{:#}", e)))?;

        let (height, width) = (engine.height(), engine.width());
        let model = Self {
            engine,
            postprocessor,
            height,
            width,
            profile: config.profile,
        };
        model.summary();
        Ok(model)
    }

    #[cfg(not(feature = "onnx"))]
    fn with_engine(
        _config: &DetectorConfig,
        _postprocessor: YOLOv8Postprocessor,
    ) -> crate::Result<Self> {
        Err(Error::backend_init(
            "built without the `onnx` feature, no inference engine available",
        ))
    }

    /// 单帧推理: letterbox → run → postprocess
    pub fn run(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let t_pre = std::time::Instant::now();
        let (xs, ratio) = crate::models::letterbox(image, self.width, self.height)?;
        if self.profile {
            tracing::debug!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }

        let ys = self.forward(xs)?;

        let t_post = std::time::Instant::now();
        let Some(preds) = ys.first() else {
            bail!("model produced no outputs");
        };
        let detections = self
            .postprocessor
            .postprocess(preds, ratio, image.dimensions())?;
        if self.profile {
            tracing::debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        }
        Ok(detections)
    }

    #[cfg(feature = "onnx")]
    fn forward(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs, self.profile)
    }

    #[cfg(not(feature = "onnx"))]
    fn forward(&mut self, _xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        bail!("no inference engine available")
    }

    pub fn names(&self) -> &[String] {
        &self.postprocessor.names
    }

    pub fn summary(&self) {
        info!(
            "📦 YOLOv8 已加载: 输入 {}x{}, 类别数 {}, conf={:.2}, iou={:.2}",
            self.width,
            self.height,
            self.postprocessor.names.len(),
            self.postprocessor.conf,
            self.postprocessor.iou
        );
    }
}

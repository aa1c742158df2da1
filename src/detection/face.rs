// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 人脸回退检测器 (Fallback face detector)
//!
//! 主检测模型不可用时使用: YCbCr 肤色分割 → 形态学开运算 → 连通域 → 形状过滤。
//! 每个结果固定为类别 "face", 置信度 0.9。

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};

use super::types::{BBox, Detection};
use crate::error::{Error, Result};

/// 固定置信度
pub const FACE_CONFIDENCE: f32 = 0.9;
pub const FACE_CLASS: &str = "face";

/// 处理分辨率上限 (长边)
const WORK_SIDE: u32 = 320;
/// 最小人脸边长 (处理分辨率下)
const MIN_SIDE: u32 = 12;
/// 高宽比范围
const ASPECT: (f32, f32) = (0.8, 2.0);
/// 连通域在外接框中的最小占比
const MIN_FILL: f32 = 0.4;

/// 区域外接框统计
#[derive(Clone, Copy)]
struct Region {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u32,
}

impl Region {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixels: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixels += 1;
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

#[derive(Debug, Default)]
pub struct FaceDetector {
    names: Vec<String>,
}

impl FaceDetector {
    pub fn new() -> Self {
        Self {
            names: vec![FACE_CLASS.to_string()],
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 肤色判定 (YCbCr 空间)
    fn is_skin(r: u8, g: u8, b: u8) -> bool {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
    }

    fn skin_mask(image: &RgbImage) -> GrayImage {
        let mut mask = GrayImage::new(image.width(), image.height());
        for (x, y, p) in image.enumerate_pixels() {
            let [r, g, b] = p.0;
            if Self::is_skin(r, g, b) {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    pub fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (w0, h0) = frame.dimensions();
        let long_side = w0.max(h0);
        let scale = if long_side > WORK_SIDE {
            WORK_SIDE as f32 / long_side as f32
        } else {
            1.0
        };

        let work = if scale < 1.0 {
            let w = ((w0 as f32 * scale).round() as u32).max(1);
            let h = ((h0 as f32 * scale).round() as u32).max(1);
            crate::models::resize_rgb(frame, w, h)
                .map_err(|e| Error::inference(format!("{:#}", e)))?
        } else {
            frame.clone()
        };

        let mask = morphology::open(&Self::skin_mask(&work), Norm::LInf, 2);
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        let mut regions: Vec<Option<Region>> = Vec::new();
        for (x, y, p) in labels.enumerate_pixels() {
            let label = p.0[0] as usize;
            if label == 0 {
                continue;
            }
            if regions.len() <= label {
                regions.resize(label + 1, None);
            }
            regions[label]
                .get_or_insert_with(|| Region::new(x, y))
                .add(x, y);
        }

        let mut faces: Vec<Detection> = regions
            .into_iter()
            .flatten()
            .filter(|r| {
                let (w, h) = (r.width(), r.height());
                if w < MIN_SIDE || h < MIN_SIDE {
                    return false;
                }
                let aspect = h as f32 / w as f32;
                let fill = r.pixels as f32 / (w * h) as f32;
                (ASPECT.0..=ASPECT.1).contains(&aspect) && fill >= MIN_FILL
            })
            .map(|r| {
                let bbox = BBox::new(
                    r.min_x as f32 / scale,
                    r.min_y as f32 / scale,
                    r.width() as f32 / scale,
                    r.height() as f32 / scale,
                );
                Detection::new(bbox, FACE_CONFIDENCE, 0, FACE_CLASS)
            })
            .collect();

        // 大区域优先
        faces.sort_by(|a, b| b.bbox.area().total_cmp(&a.bbox.area()));
        Ok(faces)
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型实现与公共预处理
///
/// ## 流程
/// ```text
/// 原始帧 → letterbox → NCHW 张量
///        ↓
///   推理引擎 (OrtBackend, `onnx` 特性)
///        ↓
///   原始输出 → postprocess (置信度过滤 + NMS) → Vec<Detection>
/// ```
///
/// 后处理不依赖推理引擎, 未启用 `onnx` 特性时同样可用。
use std::path::Path;

use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{Array, IxDyn};

pub mod yolov8; // YOLOv8 模型 + 后处理器

pub use yolov8::{YOLOv8, YOLOv8Postprocessor};

/// 内置 COCO 80 类名称 (未提供类别文件时使用)
pub const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub fn coco_names() -> Vec<String> {
    COCO_NAMES.iter().map(|s| s.to_string()).collect()
}

/// 读取类别文件 (每行一个类别名, 忽略空行)
pub fn load_class_names(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read class names from {}", path.display()))?;
    let names: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if names.is_empty() {
        bail!("class names file {} is empty", path.display());
    }
    Ok(names)
}

/// 类别文件存在则读取, 否则回退到内置 COCO 名称
pub fn class_names_or_coco(path: Option<&Path>) -> Vec<String> {
    match path {
        Some(p) if p.exists() => match load_class_names(p) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("⚠️ {:#}, 使用内置 COCO 类别", e);
                coco_names()
            }
        },
        _ => coco_names(),
    }
}

/// RGB 图像缩放 (fast_image_resize, 双线性)
pub fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
        bail!(
            "cannot resize {}x{} to {}x{}",
            image.width(),
            image.height(),
            width,
            height
        );
    }
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }

    let src_image = fr::images::Image::from_vec_u8(
        image.width(),
        image.height(),
        image.as_raw().clone(),
        fr::PixelType::U8x3,
    )?;
    let mut dst_image = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src_image,
        &mut dst_image,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;

    RgbImage::from_raw(width, height, dst_image.into_vec())
        .context("resized buffer does not match target size")
}

/// 等比缩放比例与缩放后尺寸
pub fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// Letterbox 预处理: 等比缩放贴到左上角, 其余填充灰色 (144/255)
///
/// 返回 NCHW 张量与缩放比例 (后处理时坐标除以该比例还原)
pub fn letterbox(image: &RgbImage, width: u32, height: u32) -> Result<(Array<f32, IxDyn>, f32)> {
    let (w0, h0) = image.dimensions();
    let (r, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
    let w_new = (w_new as u32).clamp(1, width);
    let h_new = (h_new as u32).clamp(1, height);
    let resized = resize_rgb(image, w_new, h_new)?;

    let mut ys = Array::ones((1, 3, height as usize, width as usize)).into_dyn();
    ys.fill(144.0 / 255.0);
    for (x, y, rgb) in resized.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = rgb.0;
        ys[[0, 0, y, x]] = (r as f32) / 255.0;
        ys[[0, 1, y, x]] = (g as f32) / 255.0;
        ys[[0, 2, y, x]] = (b as f32) / 255.0;
    }

    Ok((ys, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_coco_names() {
        let names = coco_names();
        assert_eq!(names.len(), 80);
        assert_eq!(names[0], "person");
        assert_eq!(names[79], "toothbrush");
    }

    #[test]
    fn test_class_names_file() {
        let path = std::env::temp_dir().join(format!("yolo_tracker_names_{}.txt", std::process::id()));
        std::fs::write(&path, "cat\n\n dog \n").unwrap();
        let names = class_names_or_coco(Some(&path));
        assert_eq!(names, vec!["cat".to_string(), "dog".to_string()]);
        std::fs::remove_file(&path).unwrap();

        let names = class_names_or_coco(Some(Path::new("/nonexistent/coco.names")));
        assert_eq!(names.len(), 80);
    }

    #[test]
    fn test_letterbox_shape_and_ratio() {
        let image = RgbImage::from_pixel(320, 160, Rgb([255, 0, 0]));
        let (ys, r) = letterbox(&image, 640, 640).unwrap();
        assert_eq!(ys.shape(), &[1, 3, 640, 640]);
        assert!((r - 2.0).abs() < 1e-6);
        // 缩放区域内为红色, 下方为填充灰色
        assert!((ys[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!(ys[[0, 1, 10, 10]].abs() < 1e-3);
        assert!((ys[[0, 0, 600, 10]] - 144.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_resize_rejects_empty() {
        let image = RgbImage::new(0, 0);
        assert!(resize_rgb(&image, 10, 10).is_err());
    }
}

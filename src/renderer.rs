// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 叠加层绘制 (Overlay renderer)
//! 检测框、标签、轨迹线、FPS/目标数 HUD 与时间戳

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::detection::{Track, TrackTable};

/// 高亮配色 (按类别循环)
pub const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;
const HUD_SCALE: f32 = 22.0;
const HUD_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// 内置字体 (DejaVu Sans), 配置的字体文件不存在时使用
const EMBEDDED_FONT: &[u8] = include_bytes!("../assets/font/DejaVuSans.ttf");

pub fn embedded_font() -> Option<FontArc> {
    match FontArc::try_from_slice(EMBEDDED_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("⚠️ 内置字体解析失败: {}", e);
            None
        }
    }
}

/// 加载字体
///
/// 未配置或文件不存在时回退到内置字体; 只有配置的文件无法解析时返回 None
/// (之后只画框与轨迹, 不画文字)。
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
    let Some(path) = path else {
        return embedded_font();
    };
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            info!("📝 未找到字体文件 {}: {}, 使用内置字体", path.display(), e);
            return embedded_font();
        }
    };
    match FontArc::try_from_vec(bytes) {
        Ok(font) => {
            info!("✅ 字体加载成功: {}", path.display());
            Some(font)
        }
        Err(e) => {
            warn!("⚠️ 字体解析失败 {}: {}, 标签文字将不显示", path.display(), e);
            None
        }
    }
}

/// 渲染器, 除构造时生成的配色外无其他状态
#[derive(Clone)]
pub struct Renderer {
    palette: Vec<Rgb<u8>>,
    class_index: HashMap<String, usize>,
    font: Option<FontArc>,
}

impl Renderer {
    pub fn new(class_names: &[String], font: Option<FontArc>) -> Self {
        let palette: Vec<Rgb<u8>> = (0..class_names.len().max(1))
            .map(|i| {
                let (r, g, b) = BRIGHT_COLORS[i % BRIGHT_COLORS.len()];
                Rgb([r, g, b])
            })
            .collect();
        let class_index = class_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            palette,
            class_index,
            font,
        }
    }

    /// 类别颜色 (未知类别使用第一个颜色)
    pub fn color_for(&self, class_name: &str) -> Rgb<u8> {
        let idx = self.class_index.get(class_name).copied().unwrap_or(0);
        self.palette[idx % self.palette.len()]
    }

    /// 绘制所有活跃轨迹
    pub fn render(&self, frame: &mut RgbImage, tracks: &TrackTable) {
        for track in tracks.values().filter(|t| t.is_active()) {
            let color = self.color_for(track.class_name());
            self.draw_trail(frame, track, color);
            self.draw_box(frame, track, color);
            self.draw_label(frame, track, color);
        }
    }

    fn draw_box(&self, frame: &mut RgbImage, track: &Track, color: Rgb<u8>) {
        let bbox = track.bbox();
        let x = bbox.x.round() as i32;
        let y = bbox.y.round() as i32;
        let w = bbox.width.round().max(1.0) as u32;
        let h = bbox.height.round().max(1.0) as u32;

        for offset in 0..BOX_THICKNESS {
            let rect = Rect::at(x - offset, y - offset)
                .of_size(w + (offset * 2) as u32, h + (offset * 2) as u32);
            draw_hollow_rect_mut(frame, rect, color);
        }
    }

    fn draw_label(&self, frame: &mut RgbImage, track: &Track, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let label = format!(
            "{} #{} ({:.2})",
            track.class_name(),
            track.id(),
            track.confidence()
        );
        let scale = PxScale::from(LABEL_SCALE);
        let (tw, th) = text_size(scale, font, &label);

        let x = track.bbox().x.round() as i32;
        let top = track.bbox().y.round() as i32 - th as i32 - 6;
        // 上方放不下时画在框内
        let y = if top < 0 { track.bbox().y.round() as i32 } else { top };

        draw_filled_rect_mut(frame, Rect::at(x, y).of_size(tw + 6, th + 6), color);
        draw_text_mut(frame, TEXT_COLOR, x + 3, y + 3, scale, font, &label);
    }

    fn draw_trail(&self, frame: &mut RgbImage, track: &Track, color: Rgb<u8>) {
        let history = track.history();
        if history.len() < 2 {
            return;
        }
        for (a, b) in history.iter().zip(history.iter().skip(1)) {
            draw_line_segment_mut(frame, (a.x, a.y), (b.x, b.y), color);
            draw_line_segment_mut(frame, (a.x, a.y + 1.0), (b.x, b.y + 1.0), color);
        }
    }

    /// 左上角 "FPS: x | Objects: n", 左下角时间戳
    pub fn draw_hud(&self, frame: &mut RgbImage, fps: f64, objects: usize, timestamp: &str) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(HUD_SCALE);
        let stats = format!("FPS: {:.1} | Objects: {}", fps, objects);
        draw_text_mut(frame, HUD_COLOR, 10, 10, scale, font, &stats);

        let (_, th) = text_size(scale, font, timestamp);
        let y = frame.height() as i32 - th as i32 - 10;
        draw_text_mut(frame, HUD_COLOR, 10, y.max(0), scale, font, timestamp);
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

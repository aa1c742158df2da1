// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 应用配置 - 通过JSON文件调整参数
//!
//! 文件中缺失的字段使用默认值; 文件不存在时写出一份默认配置。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::{DetectorConfig, TrackerConfig};
use crate::error::Result;
use crate::pipeline::PipelineConfig;
use crate::server::ServerConfig;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// 从JSON文件加载配置, 解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在, 创建默认配置: {}", path.display());
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前配置:");
        info!(
            "  模型: {} (conf={:.2}, nms={:.2})",
            self.detector.model.display(),
            self.detector.confidence,
            self.detector.nms
        );
        info!(
            "  跟踪: 最大距离 {:.0}px, 超时 {:.1}s, 轨迹长度 {}",
            self.tracker.max_distance, self.tracker.timeout_secs, self.tracker.history_len
        );
        info!(
            "  流水线: 帧间延时 {}ms, JPEG 质量 {}",
            self.pipeline.frame_delay_ms, self.pipeline.jpeg_quality
        );
        info!("  服务: {}:{}", self.server.host, self.server.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("yolo_tracker_cfg_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.detector.confidence, 0.5);
        assert_eq!(config.detector.nms, 0.4);
        assert_eq!(config.tracker.max_distance, 100.0);
        assert_eq!(config.tracker.timeout_secs, 2.0);
        assert_eq!(config.tracker.history_len, 30);
        assert_eq!(config.server.port, 5020);
        assert_eq!(config.pipeline.jpeg_quality, 80);
    }

    #[test]
    fn test_missing_file_writes_default() {
        let path = scratch("missing");
        let _ = fs::remove_file(&path);
        let config = AppConfig::load(&path);
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
        assert_eq!(AppConfig::load(&path), config);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = scratch("partial");
        fs::write(&path, r#"{"tracker": {"max_distance": 42.0}, "server": {"port": 8080}}"#).unwrap();
        let config = AppConfig::load(&path);
        assert_eq!(config.tracker.max_distance, 42.0);
        assert_eq!(config.tracker.timeout_secs, 2.0);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.detector, DetectorConfig::default());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_invalid_file_uses_default() {
        let path = scratch("invalid");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load(&path), AppConfig::default());
        fs::remove_file(&path).unwrap();
    }
}

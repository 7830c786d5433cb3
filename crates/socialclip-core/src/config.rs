//! 流程設定

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::captions::CaptionMode;

/// 設定錯誤
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),

    #[error("設定 JSON 無效: {0}")]
    Json(#[from] serde_json::Error),

    #[error("設定值無效: {0}")]
    Invalid(String),
}

/// 字幕在畫面上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

/// 來源長於所需時，裁切視窗的起點
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOffsetPolicy {
    /// 從 0 開始
    #[default]
    Start,
    /// 取片段中段
    Center,
    /// 從固定偏移開始，並限制在可容納視窗的範圍內
    Fixed(f64),
}

/// 字幕疊加樣式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// 字型大小（輸出像素）
    pub font_size: u32,
    pub position: CaptionPosition,
    /// 每個字幕單元的字元上限
    pub max_chars_per_unit: usize,
    pub loop_offset_policy: LoopOffsetPolicy,
    /// 傳給字幕渲染器的字型
    pub font_name: String,
    /// 字幕底框內文字周圍的留白
    pub outline_px: u32,
    /// 底框不透明度（0 = 透明，255 = 實心）
    pub banner_opacity: u8,
    /// 與畫面邊緣的距離，以畫面高度比例表示
    pub margin_ratio: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 48,
            position: CaptionPosition::Bottom,
            max_chars_per_unit: 32,
            loop_offset_policy: LoopOffsetPolicy::Start,
            font_name: "DejaVu Sans".to_string(),
            outline_px: 12,
            banner_opacity: 160,
            margin_ratio: 0.04,
        }
    }
}

/// 固定的行動呼籲素材
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtaConfig {
    /// CTA 影片片段
    pub path: Option<PathBuf>,
    /// 繪製於 CTA 片段上的文字，例如 "Subscribe Now!"
    pub text: Option<String>,
}

/// ffmpeg/ffprobe 設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub crf: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "veryfast".to_string(),
            crf: 20,
        }
    }
}

/// 執行除輸入外所需的全部設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub style: OverlayStyle,
    pub caption_mode: CaptionMode,
    /// 呼叫端提供的字幕單元之間容許的最大間隙（秒）
    pub gap_tolerance_seconds: f64,
    /// 實測與預期輸出時長的容許差距
    pub verify_tolerance_seconds: f64,
    pub cta: CtaConfig,
    pub engine: EngineConfig,
    /// 每次執行暫存目錄的上層目錄；未設定時使用系統暫存目錄
    pub work_dir: Option<PathBuf>,
    /// 保留字幕腳本與中間輸出
    pub keep_intermediates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            style: OverlayStyle::default(),
            caption_mode: CaptionMode::default(),
            gap_tolerance_seconds: 0.05,
            verify_tolerance_seconds: 0.25,
            cta: CtaConfig::default(),
            engine: EngineConfig::default(),
            work_dir: None,
            keep_intermediates: false,
        }
    }
}

impl PipelineConfig {
    /// 從 JSON 檔載入；缺少的鍵使用預設值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 檢查數值範圍
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.style.font_size == 0 {
            return Err(ConfigError::Invalid("style.font_size must be positive".into()));
        }
        if self.style.max_chars_per_unit == 0 {
            return Err(ConfigError::Invalid(
                "style.max_chars_per_unit must be positive".into(),
            ));
        }
        if !(0.0..0.5).contains(&self.style.margin_ratio) {
            return Err(ConfigError::Invalid(
                "style.margin_ratio must be in [0, 0.5)".into(),
            ));
        }
        if let LoopOffsetPolicy::Fixed(offset) = self.style.loop_offset_policy {
            if !offset.is_finite() || offset < 0.0 {
                return Err(ConfigError::Invalid(
                    "style.loop_offset_policy offset must be a non-negative number".into(),
                ));
            }
        }
        if let CaptionMode::WordCount { words_per_unit: 0 } = self.caption_mode {
            return Err(ConfigError::Invalid("words_per_unit must be positive".into()));
        }
        for (name, value) in [
            ("gap_tolerance_seconds", self.gap_tolerance_seconds),
            ("verify_tolerance_seconds", self.verify_tolerance_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
        Ok(())
    }

    /// 每次執行建立暫存目錄的所在目錄
    pub fn work_root(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("socialclip"))
    }
}

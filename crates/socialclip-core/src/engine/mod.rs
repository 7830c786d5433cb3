//! 媒體引擎介面
//!
//! 所有處理已編碼媒體的操作都經由 [`MediaEngine`]，
//! 規劃邏輯因此不需安裝 ffmpeg 即可測試。

mod ffmpeg;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OverlayStyle;
use crate::error::PipelineError;
use crate::types::{AudioFormat, MatchedClip, MediaFormat, Resolution, VideoClip};

pub use ffmpeg::{parse_probe_json, FfmpegEngine};

/// 媒體引擎錯誤
#[derive(Error, Debug)]
pub enum EngineError {
    /// 無法啟動工具程式
    #[error("無法使用媒體工具: {0}")]
    ToolMissing(String),

    /// 工具執行後回報失敗
    #[error("{tool} 執行失敗 ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// 無法解讀探測輸出
    #[error("無法解析探測輸出: {0}")]
    ProbeParse(String),

    /// 引擎無法處理的串流配置
    #[error("不支援的媒體: {0}")]
    Unsupported(String),

    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),
}

/// 視訊串流資訊
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub resolution: Resolution,
    pub frame_rate: f64,
    pub pixel_format: Option<String>,
}

/// 音訊串流資訊
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub format: AudioFormat,
}

/// 媒體檔探測結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    pub duration_seconds: f64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

impl MediaProbe {
    /// 兩種串流都存在時的接合參數
    pub fn format(&self) -> Option<MediaFormat> {
        let video = self.video.as_ref()?;
        let audio = self.audio.as_ref()?;
        Some(MediaFormat {
            resolution: video.resolution,
            frame_rate: video.frame_rate,
            audio: audio.format,
        })
    }

    /// 參數與編碼器相同，可直接串流複製接合
    pub fn join_compatible(&self, other: &MediaProbe) -> bool {
        let (Some(a), Some(b)) = (self.format(), other.format()) else {
            return false;
        };
        let same_codecs = match (
            &self.video,
            &other.video,
            &self.audio,
            &other.audio,
        ) {
            (Some(va), Some(vb), Some(aa), Some(ab)) => {
                va.codec == vb.codec && va.pixel_format == vb.pixel_format && aa.codec == ab.codec
            }
            _ => false,
        };
        a.matches(&b) && same_codecs
    }

    /// 將探測結果轉為素材庫片段
    pub fn into_clip(self, id: impl Into<String>, path: &Path) -> Result<VideoClip, PipelineError> {
        let id = id.into();
        let video = self.video.ok_or_else(|| {
            PipelineError::Asset(format!("{} has no video stream", path.display()))
        })?;
        if !video.resolution.is_valid() {
            return Err(PipelineError::Asset(format!(
                "{} has an empty frame size",
                path.display()
            )));
        }
        Ok(VideoClip {
            id,
            source_path: path.to_path_buf(),
            native_duration_seconds: self.duration_seconds,
            resolution: video.resolution,
            frame_rate: video.frame_rate,
            audio: self.audio.map(|a| a.format),
        })
    }
}

/// 在配對片段上燒入字幕並附上旁白音訊
#[derive(Debug, Clone)]
pub struct OverlayJob<'a> {
    pub matched: &'a MatchedClip,
    /// ASS 腳本；必須位於 `work_dir` 內
    pub subtitles_path: &'a Path,
    pub narration_audio: &'a Path,
    /// 輸出參數（片段畫面、旁白音訊）
    pub format: MediaFormat,
    pub output: &'a Path,
}

/// 將 CTA 片段重新編碼為旁白段落的參數
#[derive(Debug, Clone)]
pub struct NormalizeJob<'a> {
    pub input: &'a Path,
    pub duration_seconds: f64,
    pub target: MediaFormat,
    /// 來源沒有音訊串流；改用合成的靜音
    pub synthesize_silence: bool,
    /// 內容置中繪製於畫面上的文字檔
    pub text_file: Option<&'a Path>,
    pub style: &'a OverlayStyle,
    pub output: &'a Path,
}

/// 相同編碼輸入的串流複製串接
#[derive(Debug, Clone)]
pub struct ConcatJob<'a> {
    pub inputs: &'a [PathBuf],
    /// 串接清單寫入位置
    pub list_path: &'a Path,
    pub output: &'a Path,
}

/// 媒體引擎
pub trait MediaEngine: Send + Sync {
    /// 讀取串流配置與時長
    fn probe(&self, path: &Path) -> Result<MediaProbe, EngineError>;

    /// 輸出含字幕的旁白段落
    fn render_overlay(&self, job: &OverlayJob<'_>) -> Result<(), EngineError>;

    /// 將片段正規化為目標格式
    fn normalize(&self, job: &NormalizeJob<'_>) -> Result<(), EngineError>;

    /// 依序串接輸入
    fn concat(&self, job: &ConcatJob<'_>) -> Result<(), EngineError>;

    /// 日誌用的引擎名稱
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(width: u32, codec: &str, sample_rate: u32) -> MediaProbe {
        MediaProbe {
            duration_seconds: 4.0,
            video: Some(VideoStreamInfo {
                codec: codec.to_string(),
                resolution: Resolution::new(width, 1920),
                frame_rate: 30.0,
                pixel_format: Some("yuv420p".to_string()),
            }),
            audio: Some(AudioStreamInfo {
                codec: "aac".to_string(),
                format: AudioFormat {
                    sample_rate,
                    channels: 2,
                },
            }),
        }
    }

    #[test]
    fn test_join_compatible() {
        assert!(probe(1080, "h264", 48000).join_compatible(&probe(1080, "h264", 48000)));
        assert!(!probe(1080, "h264", 48000).join_compatible(&probe(720, "h264", 48000)));
        assert!(!probe(1080, "h264", 48000).join_compatible(&probe(1080, "hevc", 48000)));
        assert!(!probe(1080, "h264", 48000).join_compatible(&probe(1080, "h264", 44100)));

        let mut silent = probe(1080, "h264", 48000);
        silent.audio = None;
        assert!(!probe(1080, "h264", 48000).join_compatible(&silent));
    }

    #[test]
    fn test_into_clip_requires_video() {
        let mut audio_only = probe(1080, "h264", 48000);
        audio_only.video = None;
        let result = audio_only.into_clip("a", Path::new("a.m4a"));
        assert!(matches!(result, Err(PipelineError::Asset(_))));

        let clip = probe(1080, "h264", 48000)
            .into_clip("b", Path::new("b.mp4"))
            .unwrap();
        assert_eq!(clip.native_duration_seconds, 4.0);
        assert_eq!(clip.audio.unwrap().sample_rate, 48000);
    }
}

//! 共用資料型別

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::{AudioError, AudioProbe};

/// 差距小於此值的影格率視為相同
const FRAME_RATE_TOLERANCE: f64 = 1e-3;

/// 畫面尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 兩個維度皆非零
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 音訊串流參數
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// 取樣率 (Hz)
    pub sample_rate: u32,
    /// 聲道數
    pub channels: u16,
}

/// 接合兩側必須一致的串流參數
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub resolution: Resolution,
    pub frame_rate: f64,
    pub audio: AudioFormat,
}

impl MediaFormat {
    /// 單一影格的秒數
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.frame_rate
    }

    /// 兩種格式能否不經正規化直接接合
    pub fn matches(&self, other: &MediaFormat) -> bool {
        self.resolution == other.resolution
            && (self.frame_rate - other.frame_rate).abs() <= FRAME_RATE_TOLERANCE
            && self.audio == other.audio
    }
}

/// 合成旁白：語音音訊與其朗讀的文字。
///
/// 語音合成回報的時長是所有下游時間決策的依據。
/// 欄位為私有，執行開始使用後即不可變更。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationTrack {
    text: String,
    audio_path: PathBuf,
    audio_duration_seconds: f64,
    sample_rate: u32,
    channel_count: u16,
}

impl NarrationTrack {
    /// 由語音合成器回報的資訊建立
    pub fn new(
        text: impl Into<String>,
        audio_path: impl Into<PathBuf>,
        audio_duration_seconds: f64,
        sample_rate: u32,
        channel_count: u16,
    ) -> Self {
        Self {
            text: text.into(),
            audio_path: audio_path.into(),
            audio_duration_seconds,
            sample_rate,
            channel_count,
        }
    }

    /// 探測音訊檔的時長與格式來建立
    pub fn from_audio_file<P: AsRef<Path>>(
        text: impl Into<String>,
        audio_path: P,
    ) -> Result<Self, AudioError> {
        let info = AudioProbe::new().probe(audio_path.as_ref())?;
        Ok(Self::new(
            text,
            audio_path.as_ref(),
            info.duration,
            info.sample_rate,
            info.channels,
        ))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }

    /// 旁白長度（秒）
    pub fn duration(&self) -> f64 {
        self.audio_duration_seconds
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channel_count,
        }
    }

    /// 依朗讀順序、以空白分隔的單字
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }
}

/// 一段有時間範圍的畫面文字
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionUnit {
    /// 顯示文字
    pub text: String,
    /// 開始時間（秒，包含）
    pub start_seconds: f64,
    /// 結束時間（秒，不包含）
    pub end_seconds: f64,
}

impl CaptionUnit {
    pub fn new(text: impl Into<String>, start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            end_seconds,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// 半開區間判斷：`[start, end)`
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_seconds && t < self.end_seconds
    }
}

/// 影片素材庫中的來源片段，只做規劃、不會修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    /// 素材庫識別碼
    pub id: String,
    /// 媒體檔路徑
    pub source_path: PathBuf,
    /// 原始長度（秒）
    pub native_duration_seconds: f64,
    pub resolution: Resolution,
    pub frame_rate: f64,
    /// 音訊串流（若有）
    pub audio: Option<AudioFormat>,
}

impl VideoClip {
    /// 單一影格的秒數
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.frame_rate
    }
}

/// 裁切/循環計畫中的一段，以來源時間表示
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipSegment {
    /// 此段在來源片段中的起點
    pub source_offset_seconds: f64,
    /// 此段播放長度
    pub length_seconds: f64,
}

/// 裁切或循環至目標時長的片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedClip {
    pub base_clip: VideoClip,
    /// 恆等於旁白時長
    pub effective_duration_seconds: f64,
    /// 依序排列、長度總和等於有效時長的片段
    pub plan: Vec<ClipSegment>,
}

impl MatchedClip {
    /// 計畫片段長度總和
    pub fn plan_duration(&self) -> f64 {
        self.plan.iter().map(|s| s.length_seconds).sum()
    }

    /// 來源會播放超過一次
    pub fn is_looped(&self) -> bool {
        self.plan.len() > 1
    }
}

/// 已燒入字幕並附上旁白音訊的配對片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaidSegment {
    pub matched_clip: MatchedClip,
    pub caption_units: Vec<CaptionUnit>,
    pub rendered_video_path: PathBuf,
    /// 段落的編碼參數
    pub format: MediaFormat,
}

impl OverlaidSegment {
    pub fn duration(&self) -> f64 {
        self.matched_clip.effective_duration_seconds
    }
}

/// 固定的結尾行動呼籲 (CTA) 段落
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtaSegment {
    pub clip: VideoClip,
    pub duration_seconds: f64,
    /// 繪製於片段上的文字（選用）
    pub text: Option<String>,
}

impl CtaSegment {
    /// 以整段片段作為 CTA
    pub fn from_clip(clip: VideoClip, text: Option<String>) -> Self {
        let duration_seconds = clip.native_duration_seconds;
        Self {
            clip,
            duration_seconds,
            text,
        }
    }
}

/// 交付給發佈層的最終成品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVideo {
    /// 產生此檔案的執行
    pub run_id: String,
    pub path: PathBuf,
    /// 旁白段落加上 CTA
    pub total_duration_seconds: f64,
    pub format: MediaFormat,
}

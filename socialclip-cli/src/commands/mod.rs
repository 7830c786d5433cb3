//! CLI 子命令

pub mod assemble;
pub mod captions;
pub mod library;
pub mod plan;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use socialclip_core::{MediaEngine, NarrationTrack, Orientation, VideoClip};

pub use assemble::AssembleArgs;
pub use captions::CaptionsArgs;
pub use library::LibraryArgs;
pub use plan::PlanArgs;

/// 旁白文字與音訊，`assemble` 與 `captions` 共用
#[derive(Args, Debug, Clone)]
pub struct NarrationArgs {
    /// 旁白文字
    #[arg(long, conflicts_with = "text_file")]
    pub text: Option<String>,

    /// 存放旁白文字的檔案
    #[arg(long)]
    pub text_file: Option<PathBuf>,

    /// 旁白音訊檔
    #[arg(long)]
    pub audio: PathBuf,

    /// 語音合成器回報的時長；省略時從檔案探測
    #[arg(long)]
    pub duration: Option<f64>,

    #[arg(long, default_value_t = 48000)]
    pub sample_rate: u32,

    #[arg(long, default_value_t = 2)]
    pub channels: u16,
}

impl NarrationArgs {
    pub fn load(&self) -> Result<NarrationTrack> {
        let text = match (&self.text, &self.text_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => bail!("either --text or --text-file is required"),
        };

        match self.duration {
            Some(duration) => Ok(NarrationTrack::new(
                text,
                &self.audio,
                duration,
                self.sample_rate,
                self.channels,
            )),
            None => NarrationTrack::from_audio_file(text, &self.audio)
                .with_context(|| format!("failed to probe {}", self.audio.display())),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OrientationArg {
    Portrait,
    Landscape,
    Square,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
            OrientationArg::Square => Orientation::Square,
        }
    }
}

/// 將單一片段檔探測為素材庫紀錄
pub fn probe_clip(engine: &dyn MediaEngine, path: &Path) -> Result<VideoClip> {
    let probe = engine
        .probe(path)
        .with_context(|| format!("failed to probe {}", path.display()))?;
    let id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip".to_string());
    Ok(probe.into_clip(id, path)?)
}

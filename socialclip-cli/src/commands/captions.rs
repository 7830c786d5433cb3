//! `socialclip captions`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use socialclip_core::captions::total_duration;
use socialclip_core::{CaptionMode, CaptionSegmenter, Exporter, PipelineConfig};

use super::NarrationArgs;

#[derive(Args, Debug)]
pub struct CaptionsArgs {
    #[command(flatten)]
    pub narration: NarrationArgs,

    /// 每個字幕固定字數，取代依字元裝箱
    #[arg(long)]
    pub words_per_unit: Option<usize>,

    /// 每個字幕的字元上限
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// 寫出 SRT 而非直接輸出
    #[arg(long)]
    pub srt: Option<PathBuf>,

    /// 輸出 JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: CaptionsArgs, mut config: PipelineConfig) -> Result<()> {
    if let Some(words_per_unit) = args.words_per_unit {
        config.caption_mode = CaptionMode::WordCount { words_per_unit };
    }
    if let Some(max_chars) = args.max_chars {
        config.style.max_chars_per_unit = max_chars;
    }

    let narration = args.narration.load()?;
    let units = CaptionSegmenter::from_config(&config).segment(&narration)?;

    if let Some(path) = &args.srt {
        Exporter::to_srt(&units, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&units)?);
    } else {
        for unit in &units {
            println!(
                "{:>8.3} {:>8.3}  {}",
                unit.start_seconds, unit.end_seconds, unit.text
            );
        }
        println!(
            "{} units, {:.3}s",
            units.len(),
            total_duration(&units)
        );
    }
    Ok(())
}

//! `socialclip library`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use socialclip_core::{
    ClipCriteria, ClipLibrary, DirectoryLibrary, FfmpegEngine, Orientation, PipelineConfig,
};

use super::OrientationArg;

#[derive(Args, Debug)]
pub struct LibraryArgs {
    /// 素材庫目錄
    pub dir: PathBuf,

    /// 一併顯示此時長會選中的片段
    #[arg(long)]
    pub target: Option<f64>,

    #[arg(long, value_enum)]
    pub orientation: Option<OrientationArg>,

    /// 輸出 JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: LibraryArgs, config: PipelineConfig) -> Result<()> {
    let engine = FfmpegEngine::new(config.engine);
    let library = DirectoryLibrary::scan(&args.dir, &engine)
        .with_context(|| format!("failed to scan {}", args.dir.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(library.clips())?);
    } else {
        for clip in library.clips() {
            println!(
                "{:<40} {:>8.3}s  {:>9}  {:>6.2} fps  {:?}",
                clip.id,
                clip.native_duration_seconds,
                clip.resolution.to_string(),
                clip.frame_rate,
                Orientation::of(clip.resolution)
            );
        }
    }

    if let Some(target) = args.target {
        let criteria = ClipCriteria {
            target_duration_seconds: target,
            orientation: args.orientation.map(Into::into),
        };
        let clip = library.select(&criteria)?;
        println!("selected: {}", clip.id);
    }
    Ok(())
}

//! `socialclip assemble`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use socialclip_core::{
    DirectoryLibrary, Exporter, Pipeline, PipelineConfig, RunRequest,
};
use tracing::info;

use super::{probe_clip, NarrationArgs, OrientationArg};

#[derive(Args, Debug)]
pub struct AssembleArgs {
    #[command(flatten)]
    pub narration: NarrationArgs,

    /// 背景片段
    #[arg(long, conflicts_with = "library")]
    pub clip: Option<PathBuf>,

    /// 從此目錄挑選背景片段
    #[arg(long)]
    pub library: Option<PathBuf>,

    /// 素材庫挑選時限定畫面方向
    #[arg(long, value_enum)]
    pub orientation: Option<OrientationArg>,

    /// 行動呼籲片段（覆寫設定）
    #[arg(long)]
    pub cta: Option<PathBuf>,

    /// 繪製於 CTA 上的文字，例如 "Subscribe Now!"
    #[arg(long)]
    pub cta_text: Option<String>,

    /// 輸出影片
    #[arg(short, long)]
    pub output: PathBuf,

    /// 寫出 JSON 執行報告
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// 將字幕寫成 SRT
    #[arg(long)]
    pub srt: Option<PathBuf>,

    /// 將片段計畫寫成 EDL
    #[arg(long)]
    pub edl: Option<PathBuf>,

    /// 執行檔案的暫存目錄
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// 保留字幕腳本與中間輸出
    #[arg(long)]
    pub keep_intermediates: bool,

    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    #[arg(long)]
    pub ffprobe: Option<PathBuf>,
}

pub fn run(args: AssembleArgs, mut config: PipelineConfig) -> Result<()> {
    if let Some(path) = args.cta {
        config.cta.path = Some(path);
    }
    if args.cta_text.is_some() {
        config.cta.text = args.cta_text;
    }
    if args.work_dir.is_some() {
        config.work_dir = args.work_dir;
    }
    if let Some(path) = args.ffmpeg {
        config.engine.ffmpeg_path = path;
    }
    if let Some(path) = args.ffprobe {
        config.engine.ffprobe_path = path;
    }
    config.keep_intermediates |= args.keep_intermediates;
    config.validate()?;

    let pipeline = Pipeline::with_ffmpeg(config);
    let narration = args.narration.load()?;

    let request = match (&args.clip, &args.library) {
        (Some(clip), _) => {
            let clip = probe_clip(pipeline.engine(), clip)?;
            RunRequest::new(narration, clip, &args.output)
        }
        (None, Some(dir)) => {
            let library = DirectoryLibrary::scan(dir, pipeline.engine())
                .with_context(|| format!("failed to scan {}", dir.display()))?;
            RunRequest::with_library(
                narration,
                &library,
                args.orientation.map(Into::into),
                &args.output,
            )?
        }
        (None, None) => bail!("either --clip or --library is required"),
    };

    let summary = pipeline.run(request)?;
    info!(
        "Wrote {} ({:.3}s, run {})",
        summary.final_video.path.display(),
        summary.final_video.total_duration_seconds,
        summary.run_id
    );

    if let Some(path) = &args.report {
        Exporter::to_json(&summary, path, true)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = &args.srt {
        Exporter::to_srt(&summary.caption_units, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = &args.edl {
        Exporter::to_edl(&summary, path, None)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!("{}", summary.final_video.path.display());
    Ok(())
}

//! `socialclip plan`

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use socialclip_core::config::LoopOffsetPolicy;
use socialclip_core::{ClipLooper, FfmpegEngine, PipelineConfig, Resolution, VideoClip};

use super::probe_clip;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OffsetArg {
    Start,
    Center,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// 目標時長（秒）
    #[arg(long)]
    pub target: f64,

    /// 要探測的片段檔
    #[arg(long, conflicts_with = "native")]
    pub clip: Option<PathBuf>,

    /// 片段原始時長，取代探測檔案
    #[arg(long)]
    pub native: Option<f64>,

    /// 搭配 --native 使用的影格率
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// 裁切時的視窗位置
    #[arg(long, value_enum, conflicts_with = "offset_at")]
    pub offset: Option<OffsetArg>,

    /// 固定裁切偏移（秒）
    #[arg(long)]
    pub offset_at: Option<f64>,

    /// 輸出 JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PlanArgs, config: PipelineConfig) -> Result<()> {
    let policy = match (args.offset, args.offset_at) {
        (Some(OffsetArg::Start), _) => LoopOffsetPolicy::Start,
        (Some(OffsetArg::Center), _) => LoopOffsetPolicy::Center,
        (None, Some(offset)) => LoopOffsetPolicy::Fixed(offset),
        (None, None) => config.style.loop_offset_policy,
    };

    let clip = match (&args.clip, args.native) {
        (Some(path), _) => {
            let engine = FfmpegEngine::new(config.engine.clone());
            probe_clip(&engine, path)?
        }
        (None, Some(native)) => VideoClip {
            id: "clip".to_string(),
            source_path: PathBuf::new(),
            native_duration_seconds: native,
            resolution: Resolution::new(1080, 1920),
            frame_rate: args.fps,
            audio: None,
        },
        (None, None) => bail!("either --clip or --native is required"),
    };

    let matched = ClipLooper::new(policy).match_clip(&clip, args.target)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&matched)?);
        return Ok(());
    }

    for (i, segment) in matched.plan.iter().enumerate() {
        println!(
            "{:>3}  offset {:>8.3}  length {:>8.3}",
            i + 1,
            segment.source_offset_seconds,
            segment.length_seconds
        );
    }
    println!(
        "{} segment(s), {:.3}s of {:.3}s clip{}",
        matched.plan.len(),
        matched.plan_duration(),
        clip.native_duration_seconds,
        if matched.is_looped() { ", looped" } else { "" }
    );
    Ok(())
}

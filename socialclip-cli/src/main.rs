//! socialclip 命令列介面

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use socialclip_core::PipelineConfig;
use tracing_subscriber::EnvFilter;

use commands::{AssembleArgs, CaptionsArgs, LibraryArgs, PlanArgs};

#[derive(Parser, Debug)]
#[command(name = "socialclip", version, about = "Assemble captioned short videos")]
struct Cli {
    /// 流程設定檔 (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 除錯日誌
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 由旁白、片段與 CTA 組裝完整影片
    Assemble(AssembleArgs),
    /// 顯示或匯出旁白的字幕時間
    Captions(CaptionsArgs),
    /// 顯示片段的裁切/循環計畫
    Plan(PlanArgs),
    /// 列出素材庫目錄中的片段
    Library(LibraryArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Assemble(args) => commands::assemble::run(args, config),
        Commands::Captions(args) => commands::captions::run(args, config),
        Commands::Plan(args) => commands::plan::run(args, config),
        Commands::Library(args) => commands::library::run(args, config),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

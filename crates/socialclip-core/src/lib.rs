//! socialclip-core - 字幕同步短影片組裝
//!
//! 接收旁白音軌、背景片段與行動呼籲片段，
//! 產出一支字幕跟隨旁白的完整影片。

pub mod assembler;
pub mod audio;
pub mod captions;
pub mod config;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod library;
pub mod looper;
pub mod pipeline;
pub mod renderer;
pub mod subtitles;
pub mod types;

#[cfg(feature = "python")]
pub mod python;

#[cfg(test)]
mod testing;

pub use assembler::SequenceAssembler;
pub use captions::{caption_at, CaptionMode, CaptionSegmenter};
pub use config::PipelineConfig;
pub use engine::{FfmpegEngine, MediaEngine};
pub use error::{ErrorKind, PipelineError, RunError};
pub use exporter::Exporter;
pub use library::{ClipCriteria, ClipLibrary, DirectoryLibrary, Orientation};
pub use looper::ClipLooper;
pub use pipeline::{Pipeline, RunRequest, RunSummary};
pub use renderer::OverlayRenderer;
pub use types::*;

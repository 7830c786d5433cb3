//! 端對端執行流程
//!
//! 一次執行依序為字幕切分與片段配對（平行）、字幕疊加、序列組裝。
//! 執行期間寫出的檔案都放在各自的工作目錄，
//! 完成的檔案才移到指定輸出路徑，
//! 失敗的執行不會留下輸出。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assembler::SequenceAssembler;
use crate::captions::CaptionSegmenter;
use crate::config::PipelineConfig;
use crate::engine::{FfmpegEngine, MediaEngine};
use crate::error::{PipelineError, RunError};
use crate::library::{ClipCriteria, ClipLibrary, Orientation};
use crate::looper::ClipLooper;
use crate::renderer::OverlayRenderer;
use crate::types::{CaptionUnit, CtaSegment, FinalVideo, MatchedClip, NarrationTrack, VideoClip};

const SEGMENT_FILE: &str = "segment.mp4";

/// 單次執行的輸入
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub narration: NarrationTrack,
    /// 在旁白下裁切或循環的背景片段
    pub clip: VideoClip,
    /// 覆寫設定中的 CTA
    pub cta: Option<CtaSegment>,
    pub output_path: PathBuf,
}

impl RunRequest {
    pub fn new(narration: NarrationTrack, clip: VideoClip, output_path: impl Into<PathBuf>) -> Self {
        Self {
            narration,
            clip,
            cta: None,
            output_path: output_path.into(),
        }
    }

    /// 從 `library` 為此旁白挑選背景片段
    pub fn with_library(
        narration: NarrationTrack,
        library: &dyn ClipLibrary,
        orientation: Option<Orientation>,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let criteria = ClipCriteria {
            target_duration_seconds: narration.duration(),
            orientation,
        };
        let clip = library.select(&criteria)?.clone();
        debug!("Selected clip {} for {:.3}s narration", clip.id, narration.duration());
        Ok(Self::new(narration, clip, output_path))
    }
}

/// 成功執行的產出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub narration_duration_seconds: f64,
    pub caption_units: Vec<CaptionUnit>,
    pub matched_clip: MatchedClip,
    pub cta: CtaSegment,
    pub final_video: FinalVideo,
}

/// 影片組裝流程
pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<dyn MediaEngine>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, engine: Arc<dyn MediaEngine>) -> Self {
        Self { config, engine }
    }

    /// 依設定使用 ffmpeg/ffprobe 的流程
    pub fn with_ffmpeg(config: PipelineConfig) -> Self {
        let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
        Self::new(config, engine)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &dyn MediaEngine {
        self.engine.as_ref()
    }

    /// 探測設定中的 CTA 片段
    pub fn cta_segment(&self) -> Result<CtaSegment, PipelineError> {
        let path = self
            .config
            .cta
            .path
            .as_ref()
            .ok_or_else(|| PipelineError::Validation("no CTA clip configured".to_string()))?;
        let probe = self.engine.probe(path).map_err(|e| {
            PipelineError::Asset(format!("failed to probe CTA {}: {}", path.display(), e))
        })?;
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cta".to_string());
        let clip = probe.into_clip(id, path)?;
        Ok(CtaSegment::from_clip(clip, self.config.cta.text.clone()))
    }

    /// 為單一請求執行完整流程
    pub fn run(&self, request: RunRequest) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let work_dir = self.config.work_root().join(format!("run-{}", run_id));
        info!(
            "Run {} started: {:.3}s narration, clip {}",
            run_id,
            request.narration.duration(),
            request.clip.id
        );

        let result = self.execute(&run_id, started_at, request, &work_dir);

        if self.config.keep_intermediates {
            debug!("Keeping work directory {}", work_dir.display());
        } else if work_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&work_dir) {
                warn!("Could not remove work directory {}: {}", work_dir.display(), e);
            }
        }

        match result {
            Ok(summary) => {
                info!(
                    "Run {} finished: {} ({:.3}s)",
                    run_id,
                    summary.final_video.path.display(),
                    summary.final_video.total_duration_seconds
                );
                Ok(summary)
            }
            Err(error) => {
                warn!("Run {} failed: {}", run_id, error);
                Err(RunError { run_id, error })
            }
        }
    }

    fn execute(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        request: RunRequest,
        work_dir: &Path,
    ) -> Result<RunSummary, PipelineError> {
        let RunRequest {
            narration,
            clip,
            cta,
            output_path,
        } = request;

        if output_path.as_os_str().is_empty() {
            return Err(PipelineError::Validation("output path is empty".to_string()));
        }
        if !narration.audio_path().is_file() {
            return Err(PipelineError::Asset(format!(
                "narration audio {} not found",
                narration.audio_path().display()
            )));
        }
        if !clip.source_path.is_file() {
            return Err(PipelineError::Asset(format!(
                "background clip {} not found",
                clip.source_path.display()
            )));
        }
        let cta = match cta {
            Some(cta) => cta,
            None => self.cta_segment()?,
        };

        let segmenter = CaptionSegmenter::from_config(&self.config);
        let looper = ClipLooper::new(self.config.style.loop_offset_policy);
        let target = narration.duration();

        // The two planners share nothing, so they run side by side
        let (captions, matched) = thread::scope(|s| {
            let captions = s.spawn(|| segmenter.segment(&narration));
            let matched = s.spawn(|| looper.match_clip(&clip, target));
            (join(captions), join(matched))
        });
        let captions = captions?;
        let matched = matched?;
        info!(
            "Run {}: {} caption units, {} clip segment(s)",
            run_id,
            captions.len(),
            matched.plan.len()
        );

        fs::create_dir_all(work_dir).map_err(|e| {
            PipelineError::Render(format!(
                "failed to create work directory {}: {}",
                work_dir.display(),
                e
            ))
        })?;

        let renderer = OverlayRenderer::new(
            self.engine.as_ref(),
            &self.config.style,
            self.config.keep_intermediates,
        );
        let segment = renderer.render(
            matched.clone(),
            captions.clone(),
            &narration,
            work_dir,
            &work_dir.join(SEGMENT_FILE),
        )?;

        let staged = work_dir.join(staged_name(&output_path));
        let assembler = SequenceAssembler::new(
            self.engine.as_ref(),
            &self.config.style,
            self.config.verify_tolerance_seconds,
            self.config.keep_intermediates,
        );
        let mut final_video = assembler.assemble(run_id, segment, &cta, work_dir, &staged)?;

        move_into_place(&staged, &output_path)?;
        final_video.path = output_path;

        Ok(RunSummary {
            run_id: run_id.to_string(),
            started_at,
            narration_duration_seconds: target,
            caption_units: captions,
            matched_clip: matched,
            cta,
            final_video,
        })
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn staged_name(output: &Path) -> String {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    format!("final.{}", ext)
}

fn move_into_place(staged: &Path, output: &Path) -> Result<(), PipelineError> {
    let fail = |e: std::io::Error| {
        PipelineError::Assembly(format!("failed to write {}: {}", output.display(), e))
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(fail)?;
        }
    }
    if fs::rename(staged, output).is_err() {
        // Different filesystem: copy, then drop the staged file
        if let Err(e) = fs::copy(staged, output) {
            let _ = fs::remove_file(output);
            return Err(fail(e));
        }
        let _ = fs::remove_file(staged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{sample_format, FakeEngine};
    use crate::types::Resolution;

    struct Fixture {
        dir: tempfile::TempDir,
        engine: Arc<FakeEngine>,
    }

    impl Fixture {
        fn new(engine: FakeEngine) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let engine = Arc::new(engine);
            engine.add_media(&dir.path().join("cta.mp4"), 4.0, Some(sample_format()), true);
            fs::write(dir.path().join("narration.wav"), b"fake audio").unwrap();
            fs::write(dir.path().join("bg.mp4"), b"fake video").unwrap();
            Self { dir, engine }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn pipeline(&self) -> Pipeline {
            let mut config = PipelineConfig::default();
            config.cta.path = Some(self.path("cta.mp4"));
            config.work_dir = Some(self.path("work"));
            Pipeline::new(config, self.engine.clone())
        }

        fn narration(&self, text: &str, duration: f64) -> NarrationTrack {
            NarrationTrack::new(text, self.path("narration.wav"), duration, 48000, 2)
        }

        fn clip(&self, duration: f64) -> VideoClip {
            VideoClip {
                id: "bg.mp4".to_string(),
                source_path: self.path("bg.mp4"),
                native_duration_seconds: duration,
                resolution: Resolution::new(1080, 1920),
                frame_rate: 30.0,
                audio: None,
            }
        }

        fn work_is_empty(&self) -> bool {
            fs::read_dir(self.path("work"))
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true)
        }
    }

    #[test]
    fn test_run_produces_segment_plus_cta() {
        let fx = Fixture::new(FakeEngine::default());
        let output = fx.path("out").join("final.mp4");
        let request = RunRequest::new(
            fx.narration("Hello world, this is a test.", 6.0),
            fx.clip(20.0),
            &output,
        );

        let summary = fx.pipeline().run(request).unwrap();

        assert!((summary.final_video.total_duration_seconds - 10.0).abs() < 1e-9);
        assert_eq!(summary.final_video.path, output);
        assert!(output.exists());
        assert_eq!(summary.caption_units.first().unwrap().start_seconds, 0.0);
        assert_eq!(summary.caption_units.last().unwrap().end_seconds, 6.0);
        assert_eq!(summary.matched_clip.plan.len(), 1);
        assert_eq!(fx.engine.calls("render_overlay"), 1);
        assert_eq!(fx.engine.calls("normalize"), 0);
        assert!(fx.work_is_empty());
    }

    #[test]
    fn test_run_loops_short_clip() {
        let fx = Fixture::new(FakeEngine::default());
        let request = RunRequest::new(
            fx.narration("A longer narration that needs the clip to loop.", 10.0),
            fx.clip(3.0),
            fx.path("final.mp4"),
        );

        let summary = fx.pipeline().run(request).unwrap();
        assert_eq!(summary.matched_clip.plan.len(), 4);
        assert!((summary.final_video.total_duration_seconds - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_narration_is_validation_error() {
        let fx = Fixture::new(FakeEngine::default());
        let output = fx.path("final.mp4");
        let request = RunRequest::new(fx.narration("   ", 6.0), fx.clip(20.0), &output);

        let err = fx.pipeline().run(request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.run_id.is_empty());
        assert!(!output.exists());
        assert_eq!(fx.engine.calls("render_overlay"), 0);
    }

    #[test]
    fn test_render_failure_leaves_no_output() {
        let fx = Fixture::new(FakeEngine::failing_render());
        let output = fx.path("final.mp4");
        let request = RunRequest::new(fx.narration("Hello world.", 6.0), fx.clip(20.0), &output);

        let err = fx.pipeline().run(request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert!(!output.exists());
        assert!(fx.work_is_empty());
    }

    #[test]
    fn test_missing_cta_config_fails() {
        let fx = Fixture::new(FakeEngine::default());
        let mut config = fx.pipeline().config().clone();
        config.cta.path = None;
        let pipeline = Pipeline::new(config, fx.engine.clone());

        let request = RunRequest::new(fx.narration("Hello.", 2.0), fx.clip(5.0), fx.path("o.mp4"));
        let err = pipeline.run(request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_missing_narration_audio_is_asset_error() {
        let fx = Fixture::new(FakeEngine::default());
        let narration = NarrationTrack::new("Hello.", fx.path("missing.wav"), 2.0, 48000, 2);
        let request = RunRequest::new(narration, fx.clip(5.0), fx.path("o.mp4"));

        let err = fx.pipeline().run(request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Asset);
    }

    #[test]
    fn test_missing_clip_is_asset_error() {
        let fx = Fixture::new(FakeEngine::default());
        let mut clip = fx.clip(5.0);
        clip.source_path = fx.path("does_not_exist.mp4");
        let output = fx.path("o.mp4");
        let request = RunRequest::new(fx.narration("Hello.", 2.0), clip, &output);

        let err = fx.pipeline().run(request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Asset);
        assert_eq!(fx.engine.calls("render_overlay"), 0);
        assert!(!output.exists());
    }

    #[test]
    fn test_request_from_library() {
        use crate::library::DirectoryLibrary;

        let fx = Fixture::new(FakeEngine::default());
        let mut long = fx.clip(30.0);
        long.id = "long.mp4".to_string();
        let library = DirectoryLibrary::from_clips(fx.dir.path(), vec![fx.clip(3.0), long]);

        let request = RunRequest::with_library(
            fx.narration("Hello world.", 6.0),
            &library,
            Some(Orientation::Portrait),
            fx.path("o.mp4"),
        )
        .unwrap();
        assert_eq!(request.clip.id, "long.mp4");
    }

    #[test]
    fn test_each_run_gets_its_own_id() {
        let fx = Fixture::new(FakeEngine::default());
        let pipeline = fx.pipeline();
        let a = pipeline
            .run(RunRequest::new(fx.narration("One.", 2.0), fx.clip(5.0), fx.path("a.mp4")))
            .unwrap();
        let b = pipeline
            .run(RunRequest::new(fx.narration("Two.", 2.0), fx.clip(5.0), fx.path("b.mp4")))
            .unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.final_video.run_id, a.run_id);
    }
}

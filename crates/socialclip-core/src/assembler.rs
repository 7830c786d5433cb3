//! 最終序列組裝：旁白段落後接 CTA

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::OverlayStyle;
use crate::engine::{ConcatJob, MediaEngine, MediaProbe, NormalizeJob};
use crate::error::PipelineError;
use crate::types::{CtaSegment, FinalVideo, OverlaidSegment};

const CTA_TEXT_FILE: &str = "cta.txt";
const CTA_NORMALIZED_FILE: &str = "cta.mp4";
const CONCAT_LIST_FILE: &str = "concat.txt";

/// 序列組裝器
pub struct SequenceAssembler<'a> {
    engine: &'a dyn MediaEngine,
    style: &'a OverlayStyle,
    verify_tolerance: f64,
    keep_intermediates: bool,
}

impl<'a> SequenceAssembler<'a> {
    pub fn new(
        engine: &'a dyn MediaEngine,
        style: &'a OverlayStyle,
        verify_tolerance: f64,
        keep_intermediates: bool,
    ) -> Self {
        Self {
            engine,
            style,
            verify_tolerance,
            keep_intermediates,
        }
    }

    /// 將 `segment` 與 `cta` 接合輸出至 `output`
    pub fn assemble(
        &self,
        run_id: &str,
        segment: OverlaidSegment,
        cta: &CtaSegment,
        work_dir: &Path,
        output: &Path,
    ) -> Result<FinalVideo, PipelineError> {
        validate_cta(cta)?;

        let segment_probe = self.probe(&segment.rendered_video_path)?;
        if segment_probe.format().is_none() {
            return Err(PipelineError::Assembly(format!(
                "{} lacks a video or audio stream",
                segment.rendered_video_path.display()
            )));
        }
        let cta_probe = self.probe(&cta.clip.source_path)?;
        if cta_probe.video.is_none() {
            return Err(PipelineError::Assembly(format!(
                "CTA {} has no video stream",
                cta.clip.source_path.display()
            )));
        }

        let mut intermediates: Vec<PathBuf> = Vec::new();
        let result = self.join(
            &segment,
            &segment_probe,
            cta,
            &cta_probe,
            work_dir,
            output,
            &mut intermediates,
        );

        if !self.keep_intermediates {
            for path in &intermediates {
                if path.exists() {
                    if let Err(e) = fs::remove_file(path) {
                        warn!("Could not remove {}: {}", path.display(), e);
                    }
                }
            }
        }

        if let Err(e) = result {
            remove_partial(output);
            return Err(e);
        }

        let total = segment.duration() + cta.duration_seconds;
        info!(
            "Run {} assembled {} ({:.3}s + {:.3}s CTA = {:.3}s)",
            run_id,
            output.display(),
            segment.duration(),
            cta.duration_seconds,
            total
        );

        Ok(FinalVideo {
            run_id: run_id.to_string(),
            path: output.to_path_buf(),
            total_duration_seconds: total,
            format: segment.format,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn join(
        &self,
        segment: &OverlaidSegment,
        segment_probe: &MediaProbe,
        cta: &CtaSegment,
        cta_probe: &MediaProbe,
        work_dir: &Path,
        output: &Path,
        intermediates: &mut Vec<PathBuf>,
    ) -> Result<(), PipelineError> {
        let cta_path = if needs_normalize(segment_probe, cta, cta_probe) {
            let text_file = match &cta.text {
                Some(text) => {
                    let path = work_dir.join(CTA_TEXT_FILE);
                    fs::write(&path, text).map_err(|e| {
                        PipelineError::Assembly(format!("failed to write CTA text: {}", e))
                    })?;
                    intermediates.push(path.clone());
                    Some(path)
                }
                None => None,
            };

            let normalized = work_dir.join(CTA_NORMALIZED_FILE);
            intermediates.push(normalized.clone());
            info!(
                "Normalizing CTA {} to {}",
                cta.clip.id, segment.format.resolution
            );
            let job = NormalizeJob {
                input: &cta.clip.source_path,
                duration_seconds: cta.duration_seconds,
                target: segment.format,
                synthesize_silence: cta_probe.audio.is_none(),
                text_file: text_file.as_deref(),
                style: self.style,
                output: &normalized,
            };
            self.engine
                .normalize(&job)
                .map_err(|e| PipelineError::Assembly(format!("CTA normalization failed: {}", e)))?;
            normalized
        } else {
            debug!("CTA {} already matches the narration segment", cta.clip.id);
            cta.clip.source_path.clone()
        };

        let list_path = work_dir.join(CONCAT_LIST_FILE);
        intermediates.push(list_path.clone());
        let inputs = vec![segment.rendered_video_path.clone(), cta_path];
        self.engine
            .concat(&ConcatJob {
                inputs: &inputs,
                list_path: &list_path,
                output,
            })
            .map_err(|e| PipelineError::Assembly(format!("concatenation failed: {}", e)))?;

        let expected = segment.duration() + cta.duration_seconds;
        let measured = self.probe(output)?.duration_seconds;
        if (measured - expected).abs() > self.verify_tolerance {
            return Err(PipelineError::Assembly(format!(
                "output runs {:.3}s, expected {:.3}s",
                measured, expected
            )));
        }
        debug!("Verified output duration {:.3}s (expected {:.3}s)", measured, expected);
        Ok(())
    }

    fn probe(&self, path: &Path) -> Result<MediaProbe, PipelineError> {
        self.engine.probe(path).map_err(|e| {
            PipelineError::Assembly(format!("failed to probe {}: {}", path.display(), e))
        })
    }
}

fn validate_cta(cta: &CtaSegment) -> Result<(), PipelineError> {
    let clip = &cta.clip;
    if !cta.duration_seconds.is_finite() || cta.duration_seconds <= 0.0 {
        return Err(PipelineError::Assembly(format!(
            "CTA {} has no duration",
            clip.id
        )));
    }
    if !clip.resolution.is_valid() {
        return Err(PipelineError::Assembly(format!(
            "CTA {} has an empty frame size",
            clip.id
        )));
    }
    if !clip.frame_rate.is_finite() || clip.frame_rate <= 0.0 {
        return Err(PipelineError::Assembly(format!(
            "CTA {} has no frame rate",
            clip.id
        )));
    }
    Ok(())
}

/// CTA 僅在已與段落相符、沒有文字且播放長度等於設定時長時
/// 才能直接串流複製。
fn needs_normalize(segment: &MediaProbe, cta: &CtaSegment, cta_probe: &MediaProbe) -> bool {
    let epsilon = 1.0 / cta.clip.frame_rate;
    cta.text.is_some()
        || !segment.join_compatible(cta_probe)
        || (cta_probe.duration_seconds - cta.duration_seconds).abs() > epsilon
}

fn remove_partial(output: &Path) {
    if output.exists() {
        match fs::remove_file(output) {
            Ok(()) => debug!("Removed partial output {}", output.display()),
            Err(e) => warn!("Could not remove partial output {}: {}", output.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_format, FakeEngine};
    use crate::types::{ClipSegment, MatchedClip, Resolution, VideoClip};

    fn overlaid(engine: &FakeEngine, dir: &Path, duration: f64) -> OverlaidSegment {
        let path = dir.join("segment.mp4");
        engine.add_media(&path, duration, Some(sample_format()), true);
        OverlaidSegment {
            matched_clip: MatchedClip {
                base_clip: VideoClip {
                    id: "bg".into(),
                    source_path: dir.join("bg.mp4"),
                    native_duration_seconds: 20.0,
                    resolution: Resolution::new(1080, 1920),
                    frame_rate: 30.0,
                    audio: None,
                },
                effective_duration_seconds: duration,
                plan: vec![ClipSegment {
                    source_offset_seconds: 0.0,
                    length_seconds: duration,
                }],
            },
            caption_units: Vec::new(),
            rendered_video_path: path,
            format: sample_format(),
        }
    }

    fn cta(path: PathBuf, duration: f64, resolution: Resolution, text: Option<&str>) -> CtaSegment {
        CtaSegment {
            clip: VideoClip {
                id: "cta".into(),
                source_path: path,
                native_duration_seconds: duration,
                resolution,
                frame_rate: 30.0,
                audio: None,
            },
            duration_seconds: duration,
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_total_is_segment_plus_cta() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        let segment = overlaid(&engine, dir.path(), 6.0);
        let cta_path = dir.path().join("cta_src.mp4");
        engine.add_media(&cta_path, 4.0, Some(sample_format()), true);
        let cta = cta(cta_path, 4.0, Resolution::new(1080, 1920), None);

        let style = OverlayStyle::default();
        let assembler = SequenceAssembler::new(&engine, &style, 0.25, false);
        let output = dir.path().join("final.mp4");
        let video = assembler
            .assemble("run-1", segment, &cta, dir.path(), &output)
            .unwrap();

        assert!((video.total_duration_seconds - 10.0).abs() < 1e-9);
        assert_eq!(video.run_id, "run-1");
        assert!(output.exists());
        assert_eq!(engine.calls("normalize"), 0);
        assert!(!dir.path().join(CONCAT_LIST_FILE).exists());
    }

    #[test]
    fn test_mismatched_cta_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        let segment = overlaid(&engine, dir.path(), 6.0);
        let mut landscape = sample_format();
        landscape.resolution = Resolution::new(1920, 1080);
        let cta_path = dir.path().join("cta_src.mp4");
        engine.add_media(&cta_path, 4.0, Some(landscape), false);
        let cta = cta(cta_path, 4.0, Resolution::new(1920, 1080), Some("Subscribe Now!"));

        let style = OverlayStyle::default();
        let assembler = SequenceAssembler::new(&engine, &style, 0.25, false);
        let output = dir.path().join("final.mp4");
        let video = assembler
            .assemble("run-2", segment, &cta, dir.path(), &output)
            .unwrap();

        assert_eq!(engine.calls("normalize"), 1);
        let job = engine.last_normalize().unwrap();
        assert!(job.synthesize_silence);
        assert!(job.had_text);
        assert_eq!(job.duration_seconds, 4.0);
        assert_eq!(job.target.resolution, Resolution::new(1080, 1920));
        assert!((video.total_duration_seconds - 10.0).abs() < 1e-9);
        assert!(!dir.path().join(CTA_NORMALIZED_FILE).exists());
    }

    #[test]
    fn test_duration_drift_fails_and_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::with_concat_padding(1.0);
        let segment = overlaid(&engine, dir.path(), 6.0);
        let cta_path = dir.path().join("cta_src.mp4");
        engine.add_media(&cta_path, 4.0, Some(sample_format()), true);
        let cta = cta(cta_path, 4.0, Resolution::new(1080, 1920), None);

        let style = OverlayStyle::default();
        let assembler = SequenceAssembler::new(&engine, &style, 0.25, false);
        let output = dir.path().join("final.mp4");
        let result = assembler.assemble("run-3", segment, &cta, dir.path(), &output);

        assert!(matches!(result, Err(PipelineError::Assembly(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_invalid_cta_is_assembly_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        let segment = overlaid(&engine, dir.path(), 6.0);
        let cta = cta(dir.path().join("cta.mp4"), 4.0, Resolution::new(0, 0), None);

        let style = OverlayStyle::default();
        let assembler = SequenceAssembler::new(&engine, &style, 0.25, false);
        let result = assembler.assemble("run-4", segment, &cta, dir.path(), &dir.path().join("o.mp4"));
        assert!(matches!(result, Err(PipelineError::Assembly(_))));
    }
}

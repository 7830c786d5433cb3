//! 字幕疊加輸出

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::OverlayStyle;
use crate::engine::{MediaEngine, OverlayJob};
use crate::error::PipelineError;
use crate::subtitles::render_ass;
use crate::types::{CaptionUnit, MatchedClip, MediaFormat, NarrationTrack, OverlaidSegment};

const SUBTITLES_FILE: &str = "captions.ass";

/// 檢查字幕、計畫與旁白的差距在片段的一個影格以內。
/// 不一致時直接拒絕，不做夾限。
pub fn validate_timing(
    matched: &MatchedClip,
    units: &[CaptionUnit],
    narration_duration: f64,
) -> Result<(), PipelineError> {
    let epsilon = matched.base_clip.frame_interval();
    let target = matched.effective_duration_seconds;

    let (first, last) = match (units.first(), units.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(PipelineError::Validation(
                "no caption units to render".to_string(),
            ))
        }
    };

    if first.start_seconds.abs() > epsilon {
        return Err(PipelineError::Validation(format!(
            "captions start at {:.3}s instead of 0",
            first.start_seconds
        )));
    }
    for pair in units.windows(2) {
        if (pair[1].start_seconds - pair[0].end_seconds).abs() > epsilon {
            return Err(PipelineError::Validation(format!(
                "caption units are not contiguous at {:.3}s",
                pair[0].end_seconds
            )));
        }
    }

    for (what, value) in [
        ("caption end", last.end_seconds),
        ("clip plan", matched.plan_duration()),
        ("narration", narration_duration),
    ] {
        if (value - target).abs() > epsilon {
            return Err(PipelineError::Validation(format!(
                "{} is {:.3}s but the clip is matched to {:.3}s",
                what, value, target
            )));
        }
    }
    Ok(())
}

/// 在配對片段上燒入字幕單元並附上旁白
pub struct OverlayRenderer<'a> {
    engine: &'a dyn MediaEngine,
    style: &'a OverlayStyle,
    keep_intermediates: bool,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(engine: &'a dyn MediaEngine, style: &'a OverlayStyle, keep_intermediates: bool) -> Self {
        Self {
            engine,
            style,
            keep_intermediates,
        }
    }

    /// 輸出至 `output`，字幕腳本放在 `work_dir`
    pub fn render(
        &self,
        matched: MatchedClip,
        units: Vec<CaptionUnit>,
        narration: &NarrationTrack,
        work_dir: &Path,
        output: &Path,
    ) -> Result<OverlaidSegment, PipelineError> {
        validate_timing(&matched, &units, narration.duration())?;

        let clip = &matched.base_clip;
        if !clip.resolution.is_valid() {
            return Err(PipelineError::Asset(format!(
                "clip {} has an empty frame size",
                clip.id
            )));
        }
        let format = MediaFormat {
            resolution: clip.resolution,
            frame_rate: clip.frame_rate,
            audio: narration.audio_format(),
        };

        let subtitles_path = work_dir.join(SUBTITLES_FILE);
        let script = render_ass(&units, clip.resolution, self.style);
        fs::write(&subtitles_path, script).map_err(|e| {
            PipelineError::Render(format!("failed to write subtitle script: {}", e))
        })?;
        debug!("Wrote {} caption events to {}", units.len(), subtitles_path.display());

        info!(
            "Rendering overlay with {} on clip {} ({} segment(s), {:.3}s)",
            self.engine.name(),
            clip.id,
            matched.plan.len(),
            matched.effective_duration_seconds
        );
        let job = OverlayJob {
            matched: &matched,
            subtitles_path: &subtitles_path,
            narration_audio: narration.audio_path(),
            format,
            output,
        };
        let result = self
            .engine
            .render_overlay(&job)
            .map_err(|e| PipelineError::Render(e.to_string()));

        if !self.keep_intermediates {
            if let Err(e) = fs::remove_file(&subtitles_path) {
                warn!("Could not remove {}: {}", subtitles_path.display(), e);
            }
        }
        result?;

        if !output.exists() {
            return Err(PipelineError::Render(format!(
                "engine produced no file at {}",
                output.display()
            )));
        }

        Ok(OverlaidSegment {
            matched_clip: matched,
            caption_units: units,
            rendered_video_path: output.to_path_buf(),
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClipSegment, Resolution, VideoClip};

    fn matched(target: f64) -> MatchedClip {
        MatchedClip {
            base_clip: VideoClip {
                id: "bg".into(),
                source_path: "bg.mp4".into(),
                native_duration_seconds: 20.0,
                resolution: Resolution::new(1080, 1920),
                frame_rate: 30.0,
                audio: None,
            },
            effective_duration_seconds: target,
            plan: vec![ClipSegment {
                source_offset_seconds: 0.0,
                length_seconds: target,
            }],
        }
    }

    #[test]
    fn test_validate_timing_accepts_matching_totals() {
        let units = vec![CaptionUnit::new("a", 0.0, 2.5), CaptionUnit::new("b", 2.5, 6.0)];
        assert!(validate_timing(&matched(6.0), &units, 6.0).is_ok());
    }

    #[test]
    fn test_validate_timing_tolerates_sub_frame_drift() {
        let units = vec![CaptionUnit::new("a", 0.0, 6.02)];
        assert!(validate_timing(&matched(6.0), &units, 6.0).is_ok());
    }

    #[test]
    fn test_validate_timing_rejects_mismatch() {
        let units = vec![CaptionUnit::new("a", 0.0, 5.5)];
        let result = validate_timing(&matched(6.0), &units, 6.0);
        assert!(matches!(result, Err(PipelineError::Validation(_))));

        let units = vec![CaptionUnit::new("a", 0.0, 6.0)];
        let result = validate_timing(&matched(6.0), &units, 7.0);
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_validate_timing_rejects_gaps_and_empty() {
        let units = vec![CaptionUnit::new("a", 0.0, 2.0), CaptionUnit::new("b", 2.5, 6.0)];
        assert!(validate_timing(&matched(6.0), &units, 6.0).is_err());
        assert!(validate_timing(&matched(6.0), &[], 6.0).is_err());
    }
}

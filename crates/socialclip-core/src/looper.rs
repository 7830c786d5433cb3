//! 裁切/循環規劃
//!
//! 將素材庫片段轉為 [`MatchedClip`]，其計畫播放長度剛好等於旁白時長。
//! 計畫只取決於片段、目標時長與起點策略。

use tracing::debug;

use crate::config::LoopOffsetPolicy;
use crate::error::PipelineError;
use crate::types::{ClipSegment, MatchedClip, VideoClip};

/// 短於此值的片段不會輸出
const MIN_SEGMENT_SECONDS: f64 = 1e-6;

/// 片段循環器
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipLooper {
    policy: LoopOffsetPolicy,
}

impl ClipLooper {
    pub fn new(policy: LoopOffsetPolicy) -> Self {
        Self { policy }
    }

    /// 將 `clip` 配對到 `target` 秒
    pub fn match_clip(&self, clip: &VideoClip, target: f64) -> Result<MatchedClip, PipelineError> {
        let plan = self.plan(clip, target)?;
        let matched = MatchedClip {
            base_clip: clip.clone(),
            effective_duration_seconds: target,
            plan,
        };

        debug_assert!((matched.plan_duration() - target).abs() <= clip.frame_interval());
        debug!(
            "Matched clip {} ({:.3}s) to {:.3}s with {} segment(s)",
            clip.id,
            clip.native_duration_seconds,
            target,
            matched.plan.len()
        );
        Ok(matched)
    }

    /// 建立 `clip` 在 `target` 秒內播放的有序片段清單
    pub fn plan(&self, clip: &VideoClip, target: f64) -> Result<Vec<ClipSegment>, PipelineError> {
        if !target.is_finite() || target <= 0.0 {
            return Err(PipelineError::Validation(format!(
                "target duration must be positive, got {}",
                target
            )));
        }
        if !clip.frame_rate.is_finite() || clip.frame_rate <= 0.0 {
            return Err(PipelineError::Asset(format!(
                "clip {} has no usable frame rate",
                clip.id
            )));
        }

        let native = clip.native_duration_seconds;
        if !native.is_finite() || native < clip.frame_interval() {
            return Err(PipelineError::Asset(format!(
                "clip {} is empty or unreadable (duration {}s)",
                clip.id, native
            )));
        }

        if native >= target {
            let offset = self.trim_offset(native, target);
            return Ok(vec![ClipSegment {
                source_offset_seconds: offset,
                length_seconds: target,
            }]);
        }

        // Loop from the top: whole repeats, then one partial piece
        let mut full_repeats = (target / native).floor() as usize;
        let mut remainder = target - full_repeats as f64 * native;
        // floor() can land one short when the division rounds down
        if remainder >= native {
            full_repeats += 1;
            remainder -= native;
        }

        let mut plan: Vec<ClipSegment> = (0..full_repeats)
            .map(|_| ClipSegment {
                source_offset_seconds: 0.0,
                length_seconds: native,
            })
            .collect();

        if remainder >= MIN_SEGMENT_SECONDS {
            plan.push(ClipSegment {
                source_offset_seconds: 0.0,
                length_seconds: remainder,
            });
        }

        Ok(plan)
    }

    fn trim_offset(&self, native: f64, target: f64) -> f64 {
        let slack = native - target;
        match self.policy {
            LoopOffsetPolicy::Start => 0.0,
            LoopOffsetPolicy::Center => slack / 2.0,
            LoopOffsetPolicy::Fixed(offset) => offset.clamp(0.0, slack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resolution;

    fn clip(duration: f64) -> VideoClip {
        VideoClip {
            id: "clip".to_string(),
            source_path: "clip.mp4".into(),
            native_duration_seconds: duration,
            resolution: Resolution::new(1080, 1920),
            frame_rate: 30.0,
            audio: None,
        }
    }

    fn sum(plan: &[ClipSegment]) -> f64 {
        plan.iter().map(|s| s.length_seconds).sum()
    }

    #[test]
    fn test_loop_short_clip() {
        let plan = ClipLooper::default().plan(&clip(3.0), 10.0).unwrap();

        assert_eq!(plan.len(), 4);
        assert!(plan[..3].iter().all(|s| s.length_seconds == 3.0));
        assert!((plan[3].length_seconds - 1.0).abs() < 1e-12);
        assert!(plan.iter().all(|s| s.source_offset_seconds == 0.0));
        assert!((sum(&plan) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_trim_long_clip() {
        let plan = ClipLooper::default().plan(&clip(20.0), 6.0).unwrap();

        assert_eq!(
            plan,
            vec![ClipSegment {
                source_offset_seconds: 0.0,
                length_seconds: 6.0
            }]
        );
    }

    #[test]
    fn test_exact_length_single_segment() {
        let plan = ClipLooper::default().plan(&clip(6.0), 6.0).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].length_seconds, 6.0);
    }

    #[test]
    fn test_exact_multiple_has_no_partial() {
        let plan = ClipLooper::default().plan(&clip(2.5), 10.0).unwrap();
        assert_eq!(plan.len(), 4);
        assert!((sum(&plan) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_loop_sums_within_one_frame() {
        let looper = ClipLooper::default();
        for (native, target) in [(0.7, 13.3), (1.001, 59.94), (4.2, 4.3), (3.3, 100.0)] {
            let c = clip(native);
            let plan = looper.plan(&c, target).unwrap();
            assert!((sum(&plan) - target).abs() <= c.frame_interval());
            assert!(plan.iter().all(|s| s.source_offset_seconds == 0.0));
            assert!(plan.iter().all(|s| s.length_seconds <= native));
        }
    }

    #[test]
    fn test_offset_policies() {
        let c = clip(20.0);
        let center = ClipLooper::new(LoopOffsetPolicy::Center).plan(&c, 6.0).unwrap();
        assert_eq!(center[0].source_offset_seconds, 7.0);

        let fixed = ClipLooper::new(LoopOffsetPolicy::Fixed(3.0)).plan(&c, 6.0).unwrap();
        assert_eq!(fixed[0].source_offset_seconds, 3.0);

        let clamped = ClipLooper::new(LoopOffsetPolicy::Fixed(18.0)).plan(&c, 6.0).unwrap();
        assert_eq!(clamped[0].source_offset_seconds, 14.0);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let looper = ClipLooper::new(LoopOffsetPolicy::Center);
        let c = clip(3.7);
        assert_eq!(looper.plan(&c, 17.2).unwrap(), looper.plan(&c, 17.2).unwrap());
    }

    #[test]
    fn test_zero_length_clip_is_asset_error() {
        let result = ClipLooper::default().plan(&clip(0.0), 5.0);
        assert!(matches!(result, Err(PipelineError::Asset(_))));

        let result = ClipLooper::default().plan(&clip(0.01), 5.0);
        assert!(matches!(result, Err(PipelineError::Asset(_))));
    }

    #[test]
    fn test_invalid_target_is_validation_error() {
        let result = ClipLooper::default().plan(&clip(3.0), 0.0);
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_match_clip_records_target() {
        let matched = ClipLooper::default().match_clip(&clip(3.0), 10.0).unwrap();
        assert_eq!(matched.effective_duration_seconds, 10.0);
        assert!(matched.is_looped());
        assert!((matched.plan_duration() - 10.0).abs() < 1e-9);
    }
}

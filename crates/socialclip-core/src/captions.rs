//! 字幕切分模組
//!
//! 將旁白文字切成字幕單元，並把旁白時長分配給各單元。
//! 邊界由累積權重計算，
//! 因此最後一個單元必定剛好結束於旁白時長，
//! 相鄰單元共用同一個邊界值。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::{CaptionUnit, NarrationTrack};

/// 逐字數模式下每個單元的預設字數
pub const DEFAULT_WORDS_PER_UNIT: usize = 5;

/// 字幕單元的產生方式
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CaptionMode {
    /// 依字元上限裝入單字，按字元權重分配時間
    #[default]
    Proportional,
    /// 每單元固定字數，時間依字數平均分配
    WordCount { words_per_unit: usize },
    /// 呼叫端提供的單元，經驗證後對齊旁白
    Manual { units: Vec<CaptionUnit> },
}

/// 字幕切分器
#[derive(Debug, Clone)]
pub struct CaptionSegmenter {
    mode: CaptionMode,
    max_chars_per_unit: usize,
    gap_tolerance: f64,
}

impl CaptionSegmenter {
    pub fn new(mode: CaptionMode, max_chars_per_unit: usize, gap_tolerance: f64) -> Self {
        Self {
            mode,
            max_chars_per_unit,
            gap_tolerance,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.caption_mode.clone(),
            config.style.max_chars_per_unit,
            config.gap_tolerance_seconds,
        )
    }

    /// 產生涵蓋 `[0, narration.duration()]` 的單元
    pub fn segment(&self, narration: &NarrationTrack) -> Result<Vec<CaptionUnit>, PipelineError> {
        let duration = narration.duration();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(PipelineError::Validation(format!(
                "narration duration must be positive, got {}",
                duration
            )));
        }

        let units = match &self.mode {
            CaptionMode::Proportional => {
                let words = sanitized_words(narration.text())?;
                if self.max_chars_per_unit == 0 {
                    return Err(PipelineError::Validation(
                        "max_chars_per_unit must be positive".to_string(),
                    ));
                }
                let texts = pack_by_chars(&words, self.max_chars_per_unit);
                let weights: Vec<f64> = texts.iter().map(|t| char_weight(t)).collect();
                allocate(texts, &weights, duration)
            }
            CaptionMode::WordCount { words_per_unit } => {
                let words = sanitized_words(narration.text())?;
                if *words_per_unit == 0 {
                    return Err(PipelineError::Validation(
                        "words_per_unit must be positive".to_string(),
                    ));
                }
                let chunks: Vec<&[String]> = words.chunks(*words_per_unit).collect();
                let weights: Vec<f64> = chunks.iter().map(|c| c.len() as f64).collect();
                let texts = chunks.iter().map(|c| c.join(" ")).collect();
                allocate(texts, &weights, duration)
            }
            CaptionMode::Manual { units } => snap_manual(units, duration, self.gap_tolerance)?,
        };

        debug!(
            "Segmented narration into {} caption units over {:.3}s",
            units.len(),
            duration
        );
        Ok(units)
    }
}

/// 時間 `t` 顯示的字幕。區間為半開，共用邊界時以後一個單元為準；
/// `t` 等於最終結束時間時對應最後一個單元。
pub fn caption_at(units: &[CaptionUnit], t: f64) -> Option<&CaptionUnit> {
    let idx = units.partition_point(|u| u.start_seconds <= t);
    if idx == 0 {
        return None;
    }
    let unit = &units[idx - 1];
    if unit.contains(t) || (idx == units.len() && t == unit.end_seconds) {
        Some(unit)
    } else {
        None
    }
}

/// 單元時長總和
pub fn total_duration(units: &[CaptionUnit]) -> f64 {
    units.iter().map(|u| u.duration()).sum()
}

/// 替換字幕字型常缺少的排版字元
pub fn sanitize_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),
            '\u{2026}' => out.push_str("..."),
            '\u{00a0}' => out.push(' '),
            '\u{200b}' => {}
            _ => out.push(c),
        }
    }
    out
}

fn sanitized_words(text: &str) -> Result<Vec<String>, PipelineError> {
    let words: Vec<String> = sanitize_text(text)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if words.is_empty() {
        return Err(PipelineError::Validation(
            "narration text is empty, no captions possible".to_string(),
        ));
    }
    Ok(words)
}

fn sentence_end() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[.!?]+["')\]]*$"#).expect("static regex"))
}

/// 依單字邊界貪婪裝箱。超過上限的單字自成一個單元；
/// 句尾一定會結束目前的單元。
fn pack_by_chars(words: &[String], max_chars: usize) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();

    for word in words {
        let word_len = word.chars().count();
        if !current.is_empty() && current.chars().count() + 1 + word_len > max_chars {
            units.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);

        if sentence_end().is_match(word) {
            units.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        units.push(current);
    }
    units
}

/// 朗讀權重：可見字元數，至少為 1
fn char_weight(text: &str) -> f64 {
    text.chars().filter(|c| !c.is_whitespace()).count().max(1) as f64
}

fn allocate(texts: Vec<String>, weights: &[f64], duration: f64) -> Vec<CaptionUnit> {
    let total: f64 = weights.iter().sum();
    let last = texts.len().saturating_sub(1);
    let mut cumulative = 0.0;
    let mut start = 0.0;

    texts
        .into_iter()
        .zip(weights)
        .enumerate()
        .map(|(i, (text, weight))| {
            cumulative += weight;
            let end = if i == last {
                duration
            } else {
                duration * cumulative / total
            };
            let unit = CaptionUnit::new(text, start, end);
            start = end;
            unit
        })
        .collect()
}

fn snap_manual(
    units: &[CaptionUnit],
    duration: f64,
    tolerance: f64,
) -> Result<Vec<CaptionUnit>, PipelineError> {
    if units.is_empty() {
        return Err(PipelineError::Validation(
            "manual caption list is empty".to_string(),
        ));
    }

    let mut snapped: Vec<CaptionUnit> = Vec::with_capacity(units.len());
    let mut cursor = 0.0;

    for (i, unit) in units.iter().enumerate() {
        if unit.text.trim().is_empty() {
            return Err(PipelineError::Validation(format!(
                "caption {} has no text",
                i
            )));
        }
        if !(unit.end_seconds > unit.start_seconds) {
            return Err(PipelineError::Validation(format!(
                "caption {} ends before it starts ({:.3} -> {:.3})",
                i, unit.start_seconds, unit.end_seconds
            )));
        }

        let gap = unit.start_seconds - cursor;
        if gap < -tolerance {
            return Err(PipelineError::Validation(format!(
                "caption {} overlaps the previous one by {:.3}s",
                i, -gap
            )));
        }
        if gap > tolerance {
            return Err(PipelineError::Validation(format!(
                "gap of {:.3}s before caption {} exceeds tolerance {:.3}s",
                gap, i, tolerance
            )));
        }

        let mut snapped_unit = unit.clone();
        snapped_unit.text = sanitize_text(&unit.text);
        snapped_unit.start_seconds = cursor;
        cursor = unit.end_seconds;
        snapped.push(snapped_unit);
    }

    let tail = duration - cursor;
    if tail.abs() > tolerance {
        return Err(PipelineError::Validation(format!(
            "captions end at {:.3}s but narration lasts {:.3}s",
            cursor, duration
        )));
    }
    if let Some(last) = snapped.last_mut() {
        last.end_seconds = duration;
        if !(last.end_seconds > last.start_seconds) {
            return Err(PipelineError::Validation(
                "last caption collapses when snapped to the narration end".to_string(),
            ));
        }
    }

    Ok(snapped)
}

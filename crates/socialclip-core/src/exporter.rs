//! 執行產物匯出模組

use std::fs;
use std::path::Path;

use chrono::Local;
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::RunSummary;
use crate::types::{CaptionUnit, ClipSegment};

/// 匯出錯誤
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化錯誤: {0}")]
    Json(#[from] serde_json::Error),
}

/// 執行報告匯出器
pub struct Exporter;

impl Exporter {
    /// 寫出 JSON 執行報告
    pub fn to_json<P: AsRef<Path>>(
        summary: &RunSummary,
        output_path: P,
        pretty: bool,
    ) -> Result<(), ExportError> {
        let output_path = output_path.as_ref();
        ensure_parent(output_path)?;

        let data = JsonReport::from_summary(summary);
        let json = if pretty {
            serde_json::to_string_pretty(&data)?
        } else {
            serde_json::to_string(&data)?
        };

        fs::write(output_path, json)?;
        Ok(())
    }

    /// 將字幕寫成 SRT 檔
    pub fn to_srt<P: AsRef<Path>>(units: &[CaptionUnit], output_path: P) -> Result<(), ExportError> {
        let output_path = output_path.as_ref();
        ensure_parent(output_path)?;
        fs::write(output_path, Self::format_srt(units))?;
        Ok(())
    }

    /// 將片段計畫與 CTA 寫成 CMX 格式 EDL
    pub fn to_edl<P: AsRef<Path>>(
        summary: &RunSummary,
        output_path: P,
        title: Option<&str>,
    ) -> Result<(), ExportError> {
        let output_path = output_path.as_ref();
        ensure_parent(output_path)?;

        let fps = summary.final_video.format.frame_rate;
        let edl_title = title.unwrap_or_else(|| {
            summary
                .final_video
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Untitled")
        });

        let mut content = String::new();
        content.push_str(&format!("TITLE: {}\n", edl_title));
        content.push_str("FCM: NON-DROP FRAME\n\n");

        let base = &summary.matched_clip.base_clip;
        let mut events: Vec<(&str, ClipSegment, &Path)> = summary
            .matched_clip
            .plan
            .iter()
            .map(|s| ("BG", *s, base.source_path.as_path()))
            .collect();
        events.push((
            "CTA",
            ClipSegment {
                source_offset_seconds: 0.0,
                length_seconds: summary.cta.duration_seconds,
            },
            summary.cta.clip.source_path.as_path(),
        ));

        let mut rec_offset = 0.0;
        for (i, (reel, segment, source)) in events.iter().enumerate() {
            let start = segment.source_offset_seconds;
            let end = start + segment.length_seconds;
            content.push_str(&format!(
                "{:03}  {:<8} AA/V  C        {} {} {} {}\n",
                i + 1,
                reel,
                Self::seconds_to_timecode(start, fps),
                Self::seconds_to_timecode(end, fps),
                Self::seconds_to_timecode(rec_offset, fps),
                Self::seconds_to_timecode(rec_offset + segment.length_seconds, fps),
            ));

            let clip_name = source
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("clip");
            content.push_str(&format!("* FROM CLIP NAME: {}\n\n", clip_name));

            rec_offset += segment.length_seconds;
        }

        fs::write(output_path, content)?;
        Ok(())
    }

    fn format_srt(units: &[CaptionUnit]) -> String {
        let mut out = String::new();
        for (i, unit) in units.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                Self::srt_timestamp(unit.start_seconds),
                Self::srt_timestamp(unit.end_seconds),
                unit.text
            ));
        }
        out
    }

    fn srt_timestamp(seconds: f64) -> String {
        let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
        let ms = total_ms % 1000;
        let total_secs = total_ms / 1000;
        format!(
            "{:02}:{:02}:{:02},{:03}",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60,
            ms
        )
    }

    /// 以標稱（取整）影格率計算的非丟格時間碼
    fn seconds_to_timecode(seconds: f64, fps: f64) -> String {
        let nominal = (fps.round() as u64).max(1);
        let total_frames = (seconds.max(0.0) * fps).round() as u64;
        let frames = total_frames % nominal;
        let total_seconds = total_frames / nominal;
        let secs = total_seconds % 60;
        let total_minutes = total_seconds / 60;
        let mins = total_minutes % 60;
        let hours = total_minutes / 60;

        format!("{:02}:{:02}:{:02}:{:02}", hours, mins, secs, frames)
    }
}

fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// JSON 報告格式
#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    generated_at: String,
    run_id: &'a str,
    started_at: String,
    output: String,
    narration_duration: f64,
    cta_duration: f64,
    total_duration: f64,
    resolution: String,
    frame_rate: f64,
    clip: JsonClip<'a>,
    caption_count: usize,
    captions: &'a [CaptionUnit],
}

#[derive(Serialize)]
struct JsonClip<'a> {
    id: &'a str,
    source: String,
    native_duration: f64,
    looped: bool,
    plan: &'a [ClipSegment],
}

impl<'a> JsonReport<'a> {
    fn from_summary(summary: &'a RunSummary) -> Self {
        let video = &summary.final_video;
        let matched = &summary.matched_clip;
        Self {
            version: "1.0",
            generated_at: Local::now().to_rfc3339(),
            run_id: &summary.run_id,
            started_at: summary.started_at.to_rfc3339(),
            output: video.path.display().to_string(),
            narration_duration: summary.narration_duration_seconds,
            cta_duration: summary.cta.duration_seconds,
            total_duration: video.total_duration_seconds,
            resolution: video.format.resolution.to_string(),
            frame_rate: video.format.frame_rate,
            clip: JsonClip {
                id: &matched.base_clip.id,
                source: matched.base_clip.source_path.display().to_string(),
                native_duration: matched.base_clip.native_duration_seconds,
                looped: matched.is_looped(),
                plan: &matched.plan,
            },
            caption_count: summary.caption_units.len(),
            captions: &summary.caption_units,
        }
    }
}

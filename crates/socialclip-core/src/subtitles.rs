//! 燒入字幕用的 ASS 腳本

use std::fmt::Write as _;

use tracing::{debug, warn};

use crate::config::{CaptionPosition, OverlayStyle};
use crate::types::{CaptionUnit, Resolution};

const STYLE_NAME: &str = "Caption";

/// 產生在各單元 `[start, end)` 區間顯示的 ASS 腳本
pub fn render_ass(units: &[CaptionUnit], resolution: Resolution, style: &OverlayStyle) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "[Script Info]");
    let _ = writeln!(out, "ScriptType: v4.00+");
    let _ = writeln!(out, "PlayResX: {}", resolution.width);
    let _ = writeln!(out, "PlayResY: {}", resolution.height);
    let _ = writeln!(out, "WrapStyle: 0");
    let _ = writeln!(out, "ScaledBorderAndShadow: yes");
    out.push('\n');

    let _ = writeln!(out, "[V4+ Styles]");
    let _ = writeln!(
        out,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    );
    let _ = writeln!(out, "{}", style_line(resolution, style));
    out.push('\n');

    let _ = writeln!(out, "[Events]");
    let _ = writeln!(
        out,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    );
    for (start, end, text) in events(units) {
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},{},,0,0,0,,{}",
            format_centiseconds(start),
            format_centiseconds(end),
            STYLE_NAME,
            escape_text(&text)
        );
    }

    out
}

/// 以百分秒計的事件；取整後長度為零的單元
/// 併入下一個事件（若為最後一個則併入前一個）。
fn events(units: &[CaptionUnit]) -> Vec<(u64, u64, String)> {
    let mut events: Vec<(u64, u64, String)> = Vec::with_capacity(units.len());
    let mut carried: Option<String> = None;

    for unit in units {
        // Round each boundary on its own so neighbours share the same stamp
        let start = centiseconds(unit.start_seconds);
        let end = centiseconds(unit.end_seconds);
        if end <= start {
            debug!(
                "Caption {:?} at {:.3}s is under a centisecond, merging it",
                unit.text, unit.start_seconds
            );
            carried = Some(join_text(carried.take(), &unit.text));
            continue;
        }
        events.push((start, end, join_text(carried.take(), &unit.text)));
    }

    if let Some(text) = carried {
        match events.last_mut() {
            Some(last) => last.2 = join_text(Some(std::mem::take(&mut last.2)), &text),
            None => warn!("No caption lasts a centisecond; dropping {:?}", text),
        }
    }
    events
}

fn join_text(head: Option<String>, tail: &str) -> String {
    match head {
        Some(head) if !head.is_empty() => format!("{} {}", head, tail),
        _ => tail.to_string(),
    }
}

fn style_line(resolution: Resolution, style: &OverlayStyle) -> String {
    // Opaque box behind the text (BorderStyle 3); ASS alpha is inverted
    let box_alpha = 255 - style.banner_opacity;
    let alignment = match style.position {
        CaptionPosition::Bottom => 2,
        CaptionPosition::Center => 5,
        CaptionPosition::Top => 8,
    };
    let margin_v = ((resolution.height as f64 * style.margin_ratio).round() as u32).max(8);
    let margin_h = ((resolution.width as f64 * 0.05).round() as u32).max(16);

    format!(
        "Style: {name},{font},{size},&H00FFFFFF,&H00FFFFFF,&H{alpha:02X}000000,&H{alpha:02X}000000,\
         1,0,0,0,100,100,0,0,3,{outline},0,{alignment},{margin_h},{margin_h},{margin_v},1",
        name = STYLE_NAME,
        font = style.font_name.replace(',', " "),
        size = style.font_size,
        alpha = box_alpha,
        outline = style.outline_px,
    )
}

fn centiseconds(seconds: f64) -> u64 {
    (seconds.max(0.0) * 100.0).round() as u64
}

fn format_centiseconds(cs: u64) -> String {
    let hours = cs / 360_000;
    let minutes = (cs % 360_000) / 6_000;
    let secs = (cs % 6_000) / 100;
    let frac = cs % 100;
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, secs, frac)
}

/// ASS 時間戳 (`H:MM:SS.cc`)
pub fn ass_timestamp(seconds: f64) -> String {
    format_centiseconds(centiseconds(seconds))
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push('('),
            '}' => out.push(')'),
            '\n' => out.push_str("\\N"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

//! 以 ffmpeg/ffprobe 實作的媒體引擎

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info};

use super::{
    AudioStreamInfo, ConcatJob, EngineError, MediaEngine, MediaProbe, NormalizeJob, OverlayJob,
    VideoStreamInfo,
};
use crate::config::EngineConfig;
use crate::types::{AudioFormat, ClipSegment, MediaFormat, Resolution};

/// 錯誤中保留的 stderr 尾段長度
const STDERR_TAIL_CHARS: usize = 2000;
const PAD_AUDIO: &str = "apad[aout]";

/// 呼叫 ffmpeg 與 ffprobe 的引擎
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    config: EngineConfig,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn run(&self, program: &Path, args: &[String], cwd: Option<&Path>) -> Result<Vec<u8>, EngineError> {
        let tool = program.display().to_string();
        debug!("Running {} {}", tool, args.join(" "));

        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|e| match e.kind() {
            ErrorKind::NotFound => EngineError::ToolMissing(tool.clone()),
            _ => EngineError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
            return Err(EngineError::ToolFailed {
                tool,
                status: output.status.to_string(),
                stderr: stderr.chars().skip(skip).collect::<String>().trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    fn encode_args(&self, format: &MediaFormat) -> Vec<String> {
        vec![
            "-c:v".into(),
            self.config.video_codec.clone(),
            "-preset".into(),
            self.config.preset.clone(),
            "-crf".into(),
            self.config.crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-r".into(),
            fmt_num(format.frame_rate),
            "-c:a".into(),
            self.config.audio_codec.clone(),
            "-ar".into(),
            format.audio.sample_rate.to_string(),
            "-ac".into(),
            format.audio.channels.to_string(),
        ]
    }

    fn overlay_args(&self, job: &OverlayJob<'_>) -> Result<Vec<String>, EngineError> {
        let subtitles_name = safe_file_name(job.subtitles_path)?;
        let plan = &job.matched.plan;
        if plan.is_empty() {
            return Err(EngineError::Unsupported("empty clip plan".to_string()));
        }

        let mut args = base_args();
        let mut graph = if let Some(repeats) = loop_repeats(plan, job.matched.base_clip.native_duration_seconds) {
            // Whole-clip repeats from offset 0: let the demuxer loop instead of
            // buffering copies in the filter graph
            if repeats > 0 {
                args.push("-stream_loop".into());
                args.push(repeats.to_string());
            }
            let total: f64 = plan.iter().map(|s| s.length_seconds).sum();
            format!(
                "[0:v]trim=start=0:duration={},setpts=PTS-STARTPTS[base];{}",
                fmt_num(total),
                finish_filter("[base]", &job.format, &subtitles_name)
            )
        } else {
            split_trim_filter(plan, &job.format, &subtitles_name)
        };
        // Narration shorter than its reported duration is padded with silence,
        // then cut by -t together with the picture
        graph.push_str(&format!(";[1:a]{}", PAD_AUDIO));

        args.extend([
            "-i".into(),
            absolute(&job.matched.base_clip.source_path)?.display().to_string(),
            "-i".into(),
            absolute(job.narration_audio)?.display().to_string(),
            "-filter_complex".into(),
            graph,
            "-map".into(),
            "[vout]".into(),
            "-map".into(),
            "[aout]".into(),
        ]);
        args.extend(self.encode_args(&job.format));
        args.extend([
            "-t".into(),
            fmt_num(job.matched.effective_duration_seconds),
            "-movflags".into(),
            "+faststart".into(),
            absolute(job.output)?.display().to_string(),
        ]);
        Ok(args)
    }

    fn normalize_args(&self, job: &NormalizeJob<'_>) -> Result<Vec<String>, EngineError> {
        let target = &job.target;
        let (w, h) = (target.resolution.width, target.resolution.height);

        let mut args = base_args();
        args.extend(["-i".into(), absolute(job.input)?.display().to_string()]);
        if job.synthesize_silence {
            let layout = if target.audio.channels == 1 { "mono" } else { "stereo" };
            args.extend([
                "-f".into(),
                "lavfi".into(),
                "-t".into(),
                fmt_num(job.duration_seconds),
                "-i".into(),
                format!(
                    "anullsrc=channel_layout={}:sample_rate={}",
                    layout, target.audio.sample_rate
                ),
            ]);
        }

        let mut video = format!(
            "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={}",
            fmt_num(target.frame_rate)
        );
        if let Some(text_file) = job.text_file {
            video.push_str(&format!(
                ",drawtext=textfile={}:font='{}':fontsize={}:fontcolor=white:\
                 box=1:boxcolor=black@{:.2}:boxborderw={}:x=(w-text_w)/2:y=(h-text_h)/2",
                safe_file_name(text_file)?,
                safe_font_name(&job.style.font_name),
                job.style.font_size,
                job.style.banner_opacity as f64 / 255.0,
                job.style.outline_px
            ));
        }
        video.push_str("[vout]");

        let audio_input = if job.synthesize_silence { "[1:a]" } else { "[0:a]" };
        video.push_str(&format!(";{}{}", audio_input, PAD_AUDIO));
        args.extend([
            "-filter_complex".into(),
            video,
            "-map".into(),
            "[vout]".into(),
            "-map".into(),
            "[aout]".into(),
        ]);
        args.extend(self.encode_args(target));
        args.extend([
            "-t".into(),
            fmt_num(job.duration_seconds),
            "-movflags".into(),
            "+faststart".into(),
            absolute(job.output)?.display().to_string(),
        ]);
        Ok(args)
    }
}

impl MediaEngine for FfmpegEngine {
    fn probe(&self, path: &Path) -> Result<MediaProbe, EngineError> {
        if !path.exists() {
            return Err(EngineError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            path.display().to_string(),
        ];
        let stdout = self.run(&self.config.ffprobe_path, &args, None)?;
        parse_probe_json(&String::from_utf8_lossy(&stdout))
    }

    fn render_overlay(&self, job: &OverlayJob<'_>) -> Result<(), EngineError> {
        let args = self.overlay_args(job)?;
        info!(
            "Rendering {:.3}s captioned segment to {}",
            job.matched.effective_duration_seconds,
            job.output.display()
        );
        self.run(&self.config.ffmpeg_path, &args, job.subtitles_path.parent())?;
        Ok(())
    }

    fn normalize(&self, job: &NormalizeJob<'_>) -> Result<(), EngineError> {
        let args = self.normalize_args(job)?;
        info!(
            "Normalizing {} to {} @ {} fps",
            job.input.display(),
            job.target.resolution,
            fmt_num(job.target.frame_rate)
        );
        let cwd = job.text_file.and_then(Path::parent);
        self.run(&self.config.ffmpeg_path, &args, cwd)?;
        Ok(())
    }

    fn concat(&self, job: &ConcatJob<'_>) -> Result<(), EngineError> {
        let mut list = String::new();
        for input in job.inputs {
            list.push_str(&format!("file '{}'\n", escape_concat_path(&absolute(input)?)));
        }
        fs::write(job.list_path, list)?;

        let args = concat_args(&absolute(job.list_path)?, &absolute(job.output)?);
        info!("Concatenating {} inputs into {}", job.inputs.len(), job.output.display());
        self.run(&self.config.ffmpeg_path, &args, None)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// 解析 `ffprobe -print_format json -show_format -show_streams` 輸出
pub fn parse_probe_json(json: &str) -> Result<MediaProbe, EngineError> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|e| EngineError::ProbeParse(e.to_string()))?;

    let video_stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio_stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let video = match video_stream {
        Some(s) => {
            let frame_rate = s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_rate)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_rate))
                .ok_or_else(|| EngineError::ProbeParse("video stream has no frame rate".into()))?;
            Some(VideoStreamInfo {
                codec: s.codec_name.clone().unwrap_or_default(),
                resolution: Resolution::new(s.width.unwrap_or(0), s.height.unwrap_or(0)),
                frame_rate,
                pixel_format: s.pix_fmt.clone(),
            })
        }
        None => None,
    };

    let audio = match audio_stream {
        Some(s) => {
            let sample_rate = s
                .sample_rate
                .as_deref()
                .and_then(|r| r.parse::<u32>().ok())
                .ok_or_else(|| EngineError::ProbeParse("audio stream has no sample rate".into()))?;
            Some(AudioStreamInfo {
                codec: s.codec_name.clone().unwrap_or_default(),
                format: AudioFormat {
                    sample_rate,
                    channels: s.channels.unwrap_or(2),
                },
            })
        }
        None => None,
    };

    let duration_seconds = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video_stream.and_then(|s| s.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| EngineError::ProbeParse("missing duration".into()))?;

    Ok(MediaProbe {
        duration_seconds,
        video,
        audio,
    })
}

/// "30000/1001" -> 29.97；"0/0" -> None
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn base_args() -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
    ]
}

fn concat_args(list_path: &Path, output: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_path.display().to_string(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.display().to_string(),
    ]);
    args
}

/// 計畫為整段素材從 0 起播放 `n + 1` 次時回傳 `Some(n)`，
/// 最後一輪可提前截斷。
fn loop_repeats(plan: &[ClipSegment], native: f64) -> Option<usize> {
    let (last, full) = plan.split_last()?;
    let from_top = plan.iter().all(|s| s.source_offset_seconds == 0.0);
    let whole = full.iter().all(|s| s.length_seconds == native);
    (from_top && whole && (full.is_empty() || last.length_seconds <= native))
        .then_some(full.len())
}

/// 一般計畫：分流來源後逐段裁切
fn split_trim_filter(plan: &[ClipSegment], format: &MediaFormat, subtitles_name: &str) -> String {
    let n = plan.len();
    let mut parts = Vec::with_capacity(n + 3);

    let inputs: Vec<String> = if n > 1 {
        let labels: Vec<String> = (0..n).map(|i| format!("[src{}]", i)).collect();
        parts.push(format!("[0:v]split={}{}", n, labels.concat()));
        labels
    } else {
        vec!["[0:v]".to_string()]
    };

    for (i, (segment, input)) in plan.iter().zip(&inputs).enumerate() {
        parts.push(format!(
            "{}trim=start={}:duration={},setpts=PTS-STARTPTS[seg{}]",
            input,
            fmt_num(segment.source_offset_seconds),
            fmt_num(segment.length_seconds),
            i
        ));
    }

    let base = if n > 1 {
        let labels: String = (0..n).map(|i| format!("[seg{}]", i)).collect();
        parts.push(format!("{}concat=n={}:v=1:a=0[base]", labels, n));
        "[base]"
    } else {
        "[seg0]"
    };

    parts.push(finish_filter(base, format, subtitles_name));
    parts.join(";")
}

fn finish_filter(input: &str, format: &MediaFormat, subtitles_name: &str) -> String {
    format!(
        "{}fps={},scale={}:{},setsar=1,ass={}[vout]",
        input,
        fmt_num(format.frame_rate),
        format.resolution.width,
        format.resolution.height,
        subtitles_name
    )
}

/// 六位小數，去除尾端的零
fn fmt_num(value: f64) -> String {
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// 濾鏡圖中的檔名以工作目錄為基準引用，
/// 未跳脫時只接受保守的字元集。
fn safe_file_name(path: &Path) -> Result<String, EngineError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::Unsupported(format!("bad file name: {}", path.display())))?;
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        Ok(name.to_string())
    } else {
        Err(EngineError::Unsupported(format!(
            "file name not usable in a filter graph: {}",
            name
        )))
    }
}

fn safe_font_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-')
        .collect()
}

fn escape_concat_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

fn absolute(path: &Path) -> Result<PathBuf, EngineError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

//! 測試用的記憶體內媒體引擎

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::engine::{
    AudioStreamInfo, ConcatJob, EngineError, MediaEngine, MediaProbe, NormalizeJob, OverlayJob,
    VideoStreamInfo,
};
use crate::types::{AudioFormat, MediaFormat, Resolution};

pub fn sample_format() -> MediaFormat {
    MediaFormat {
        resolution: Resolution::new(1080, 1920),
        frame_rate: 30.0,
        audio: AudioFormat {
            sample_rate: 48000,
            channels: 2,
        },
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeRecord {
    pub target: MediaFormat,
    pub duration_seconds: f64,
    pub synthesize_silence: bool,
    pub had_text: bool,
}

/// 寫出佔位檔並記住「編碼」結果，
/// 讓之後的探測回報一致的時長與格式。
#[derive(Default)]
pub struct FakeEngine {
    media: Mutex<HashMap<PathBuf, MediaProbe>>,
    calls: Mutex<Vec<&'static str>>,
    normalized: Mutex<Vec<NormalizeRecord>>,
    fail_render: bool,
    /// 加到串接時長上，模擬接合錯誤
    concat_padding_seconds: f64,
}

impl FakeEngine {
    pub fn failing_render() -> Self {
        Self {
            fail_render: true,
            ..Self::default()
        }
    }

    pub fn with_concat_padding(seconds: f64) -> Self {
        Self {
            concat_padding_seconds: seconds,
            ..Self::default()
        }
    }

    /// 在 `path` 建立佔位檔並登記其探測結果
    pub fn add_media(&self, path: &Path, duration: f64, format: Option<MediaFormat>, with_audio: bool) {
        fs::write(path, b"fake media").unwrap();
        let probe = MediaProbe {
            duration_seconds: duration,
            video: format.map(|f| VideoStreamInfo {
                codec: "h264".to_string(),
                resolution: f.resolution,
                frame_rate: f.frame_rate,
                pixel_format: Some("yuv420p".to_string()),
            }),
            audio: format.filter(|_| with_audio).map(|f| AudioStreamInfo {
                codec: "aac".to_string(),
                format: f.audio,
            }),
        };
        self.media.lock().unwrap().insert(path.to_path_buf(), probe);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    pub fn last_normalize(&self) -> Option<NormalizeRecord> {
        self.normalized.lock().unwrap().last().cloned()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

impl MediaEngine for FakeEngine {
    fn probe(&self, path: &Path) -> Result<MediaProbe, EngineError> {
        self.record("probe");
        self.media
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                EngineError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                ))
            })
    }

    fn render_overlay(&self, job: &OverlayJob<'_>) -> Result<(), EngineError> {
        self.record("render_overlay");
        if self.fail_render {
            return Err(EngineError::ToolFailed {
                tool: "fake".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "render failed".to_string(),
            });
        }
        assert!(job.subtitles_path.exists(), "subtitle script must exist while rendering");
        self.add_media(
            job.output,
            job.matched.effective_duration_seconds,
            Some(job.format),
            true,
        );
        Ok(())
    }

    fn normalize(&self, job: &NormalizeJob<'_>) -> Result<(), EngineError> {
        self.record("normalize");
        self.normalized.lock().unwrap().push(NormalizeRecord {
            target: job.target,
            duration_seconds: job.duration_seconds,
            synthesize_silence: job.synthesize_silence,
            had_text: job.text_file.map(|p| p.exists()).unwrap_or(false),
        });
        self.add_media(job.output, job.duration_seconds, Some(job.target), true);
        Ok(())
    }

    fn concat(&self, job: &ConcatJob<'_>) -> Result<(), EngineError> {
        self.record("concat");
        let list: String = job
            .inputs
            .iter()
            .map(|p| format!("file '{}'\n", p.display()))
            .collect();
        fs::write(job.list_path, list)?;

        let (duration, format) = {
            let media = self.media.lock().unwrap();
            let mut duration = 0.0;
            let mut format = None;
            for input in job.inputs {
                let probe = media.get(input).ok_or_else(|| {
                    EngineError::Unsupported(format!("unknown input {}", input.display()))
                })?;
                duration += probe.duration_seconds;
                format = format.or_else(|| probe.format());
            }
            (duration + self.concat_padding_seconds, format)
        };
        self.add_media(job.output, duration, format, true);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

//! 旁白音訊探測

use std::fs::File;
use std::path::Path;

use hound::WavReader;
use serde::{Deserialize, Serialize};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// 音訊探測錯誤
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("找不到音訊檔: {0}")]
    FileNotFound(String),

    #[error("不支援的音訊格式: {0}")]
    UnsupportedFormat(String),

    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV 錯誤: {0}")]
    Hound(#[from] hound::Error),

    #[error("解碼錯誤: {0}")]
    Decode(String),
}

/// 音訊檔基本資訊
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    /// 檔案路徑
    pub path: String,
    /// 時長（秒）
    pub duration: f64,
    /// 取樣率 (Hz)
    pub sample_rate: u32,
    /// 聲道數
    pub channels: u16,
    /// 位元深度（容器未標示時為 16）
    pub bits_per_sample: u16,
}

/// 讀取旁白音訊的時長與串流參數
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioProbe;

impl AudioProbe {
    pub fn new() -> Self {
        Self
    }

    /// 探測音訊檔
    pub fn probe(&self, path: &Path) -> Result<AudioInfo, AudioError> {
        if !path.exists() {
            return Err(AudioError::FileNotFound(path.display().to_string()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        let info = match extension.as_deref() {
            // hound reads the header directly, no decoding needed
            Some("wav") => self.probe_wav(path)?,
            Some("mp3") | Some("m4a") | Some("aac") | Some("flac") | Some("ogg") => {
                self.probe_symphonia(path)?
            }
            Some(ext) => return Err(AudioError::UnsupportedFormat(ext.to_string())),
            None => return Err(AudioError::UnsupportedFormat("unknown".to_string())),
        };

        if !(info.duration > 0.0) {
            return Err(AudioError::Decode(format!(
                "{} has no playable audio",
                path.display()
            )));
        }

        Ok(info)
    }

    fn probe_wav(&self, path: &Path) -> Result<AudioInfo, AudioError> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        // duration() counts frames, not interleaved samples
        let duration = reader.duration() as f64 / spec.sample_rate as f64;

        Ok(AudioInfo {
            path: path.display().to_string(),
            duration,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        })
    }

    fn probe_symphonia(&self, path: &Path) -> Result<AudioInfo, AudioError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::Decode(format!("cannot probe format: {}", e)))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode("no audio track".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| AudioError::Decode("missing sample rate".to_string()))?;

        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let bits_per_sample = codec_params.bits_per_sample.unwrap_or(16) as u16;

        let duration = match codec_params.n_frames {
            Some(n_frames) => n_frames as f64 / sample_rate as f64,
            None => {
                // Streams without a frame count in the header: walk the packets
                let mut total_ts: u64 = 0;
                loop {
                    match format.next_packet() {
                        Ok(packet) if packet.track_id() == track_id => {
                            total_ts += packet.dur();
                        }
                        Ok(_) => continue,
                        Err(symphonia::core::errors::Error::IoError(ref e))
                            if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                        {
                            break;
                        }
                        Err(e) => {
                            return Err(AudioError::Decode(format!("packet read failed: {}", e)));
                        }
                    }
                }

                match codec_params.time_base {
                    Some(tb) => {
                        let time = tb.calc_time(total_ts);
                        time.seconds as f64 + time.frac
                    }
                    None => total_ts as f64 / sample_rate as f64,
                }
            }
        };

        Ok(AudioInfo {
            path: path.display().to_string(),
            duration,
            sample_rate,
            channels,
            bits_per_sample,
        })
    }
}

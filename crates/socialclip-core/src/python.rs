//! Python 綁定 (PyO3)

use pyo3::create_exception;
use pyo3::exceptions::PyException;
use pyo3::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::captions::{CaptionMode, CaptionSegmenter};
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::exporter::Exporter;
use crate::looper::ClipLooper;
use crate::pipeline::{Pipeline, RunRequest, RunSummary};
use crate::types::{NarrationTrack, Resolution, VideoClip};

create_exception!(_core, ValidationError, PyException);
create_exception!(_core, AssetError, PyException);
create_exception!(_core, RenderError, PyException);
create_exception!(_core, AssemblyError, PyException);

fn to_py_err(kind: ErrorKind, message: String) -> PyErr {
    match kind {
        ErrorKind::Validation => ValidationError::new_err(message),
        ErrorKind::Asset => AssetError::new_err(message),
        ErrorKind::Render => RenderError::new_err(message),
        ErrorKind::Assembly => AssemblyError::new_err(message),
    }
}

impl From<PipelineError> for PyErr {
    fn from(err: PipelineError) -> Self {
        to_py_err(err.kind(), err.to_string())
    }
}

/// Python 流程物件
#[pyclass(name = "Pipeline")]
pub struct PyPipeline {
    inner: Pipeline,
}

#[pymethods]
impl PyPipeline {
    #[new]
    #[pyo3(signature = (config_path=None, cta_path=None, cta_text=None))]
    fn new(config_path: Option<&str>, cta_path: Option<&str>, cta_text: Option<&str>) -> PyResult<Self> {
        let mut config = match config_path {
            Some(path) => PipelineConfig::from_json_file(path)
                .map_err(|e| ValidationError::new_err(e.to_string()))?,
            None => PipelineConfig::default(),
        };
        if let Some(path) = cta_path {
            config.cta.path = Some(path.into());
        }
        if let Some(text) = cta_text {
            config.cta.text = Some(text.to_string());
        }
        Ok(Self {
            inner: Pipeline::with_ffmpeg(config),
        })
    }

    /// 組裝一支影片，回傳描述結果的 dict
    #[pyo3(signature = (text, audio_path, clip_path, output_path, duration=None, sample_rate=48000, channels=2, report_path=None))]
    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        py: Python<'_>,
        text: &str,
        audio_path: &str,
        clip_path: &str,
        output_path: &str,
        duration: Option<f64>,
        sample_rate: u32,
        channels: u16,
        report_path: Option<&str>,
    ) -> PyResult<HashMap<String, PyObject>> {
        let narration = match duration {
            Some(d) => NarrationTrack::new(text, audio_path, d, sample_rate, channels),
            None => NarrationTrack::from_audio_file(text, audio_path)
                .map_err(PipelineError::from)?,
        };

        let clip_path = Path::new(clip_path);
        let probe = self
            .inner
            .engine()
            .probe(clip_path)
            .map_err(|e| AssetError::new_err(e.to_string()))?;
        let id = clip_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip".to_string());
        let clip = probe.into_clip(id, clip_path)?;

        let request = RunRequest::new(narration, clip, output_path);
        let summary = py
            .allow_threads(|| self.inner.run(request))
            .map_err(|e| to_py_err(e.kind(), e.to_string()))?;

        if let Some(path) = report_path {
            Exporter::to_json(&summary, path, true)
                .map_err(|e| PyErr::new::<pyo3::exceptions::PyIOError, _>(e.to_string()))?;
        }

        Ok(summary_dict(py, &summary))
    }
}

fn summary_dict(py: Python<'_>, summary: &RunSummary) -> HashMap<String, PyObject> {
    let video = &summary.final_video;
    let captions: Vec<(String, f64, f64)> = summary
        .caption_units
        .iter()
        .map(|u| (u.text.clone(), u.start_seconds, u.end_seconds))
        .collect();

    let mut dict = HashMap::new();
    dict.insert("run_id".to_string(), summary.run_id.clone().into_py(py));
    dict.insert("path".to_string(), video.path.display().to_string().into_py(py));
    dict.insert(
        "total_duration".to_string(),
        video.total_duration_seconds.into_py(py),
    );
    dict.insert(
        "narration_duration".to_string(),
        summary.narration_duration_seconds.into_py(py),
    );
    dict.insert(
        "cta_duration".to_string(),
        summary.cta.duration_seconds.into_py(py),
    );
    dict.insert(
        "looped".to_string(),
        summary.matched_clip.is_looped().into_py(py),
    );
    dict.insert("captions".to_string(), captions.into_py(py));
    dict
}

/// 把 `text` 的字幕單元分配到 `duration` 秒內
#[pyfunction]
#[pyo3(signature = (text, duration, max_chars_per_unit=32, words_per_unit=None))]
fn segment_captions(
    text: &str,
    duration: f64,
    max_chars_per_unit: usize,
    words_per_unit: Option<usize>,
) -> PyResult<Vec<(String, f64, f64)>> {
    let mode = match words_per_unit {
        Some(words_per_unit) => CaptionMode::WordCount { words_per_unit },
        None => CaptionMode::Proportional,
    };
    let narration = NarrationTrack::new(text, "", duration, 48000, 2);
    let units = CaptionSegmenter::new(mode, max_chars_per_unit, 0.05).segment(&narration)?;
    Ok(units
        .into_iter()
        .map(|u| (u.text, u.start_seconds, u.end_seconds))
        .collect())
}

/// 以 `(source_offset, length)` 組表示的裁切/循環計畫
#[pyfunction]
#[pyo3(signature = (native_duration, target, frame_rate=30.0))]
fn plan_clip(native_duration: f64, target: f64, frame_rate: f64) -> PyResult<Vec<(f64, f64)>> {
    let clip = VideoClip {
        id: "clip".to_string(),
        source_path: "".into(),
        native_duration_seconds: native_duration,
        resolution: Resolution::new(1080, 1920),
        frame_rate,
        audio: None,
    };
    let plan = ClipLooper::default().plan(&clip, target)?;
    Ok(plan
        .into_iter()
        .map(|s| (s.source_offset_seconds, s.length_seconds))
        .collect())
}

/// Python 模組初始化
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    m.add_class::<PyPipeline>()?;
    m.add_function(wrap_pyfunction!(segment_captions, m)?)?;
    m.add_function(wrap_pyfunction!(plan_clip, m)?)?;
    m.add("ValidationError", py.get_type_bound::<ValidationError>())?;
    m.add("AssetError", py.get_type_bound::<AssetError>())?;
    m.add("RenderError", py.get_type_bound::<RenderError>())?;
    m.add("AssemblyError", py.get_type_bound::<AssemblyError>())?;
    Ok(())
}

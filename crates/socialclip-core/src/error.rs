//! 流程錯誤型別

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioError;

/// 流程失敗的類別。皆非暫時性錯誤，
/// 核心內部不會重試。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 格式錯誤、空白或前後矛盾的輸入資料
    Validation,
    /// 缺少、無法讀取或長度為零的來源媒體
    Asset,
    /// 字幕疊加輸出失敗
    Render,
    /// 最終串接或正規化失敗
    Assembly,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Asset => write!(f, "asset"),
            ErrorKind::Render => write!(f, "render"),
            ErrorKind::Assembly => write!(f, "assembly"),
        }
    }
}

/// 階段失敗
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("驗證錯誤: {0}")]
    Validation(String),

    #[error("素材錯誤: {0}")]
    Asset(String),

    #[error("輸出錯誤: {0}")]
    Render(String),

    #[error("組裝錯誤: {0}")]
    Assembly(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Asset(_) => ErrorKind::Asset,
            PipelineError::Render(_) => ErrorKind::Render,
            PipelineError::Assembly(_) => ErrorKind::Assembly,
        }
    }
}

impl From<AudioError> for PipelineError {
    fn from(err: AudioError) -> Self {
        PipelineError::Asset(err.to_string())
    }
}

/// 失敗的執行，附帶其識別碼以供回報
#[derive(Error, Debug)]
#[error("執行 {run_id} 失敗 ({}): {error}", .error.kind())]
pub struct RunError {
    pub run_id: String,
    #[source]
    pub error: PipelineError,
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

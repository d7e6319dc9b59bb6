use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// A single input row that could not be turned into a valid record.
///
/// Row-level and non-fatal: the loader skips the row, counts it and keeps going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}:{line}: {reason}", file.display())]
pub struct DataFormatError {
    pub file: PathBuf,
    /// 1-based line number in the source file (header is line 1)
    pub line: u64,
    pub reason: String,
}

impl DataFormatError {
    pub fn new(file: impl Into<PathBuf>, line: u64, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Why an anchor row has no label.
///
/// Never surfaced past the dataset assembler: such rows are dropped and counted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("forward window not fully observed ({observed_days} of {window_days} days)")]
    RightCensored { observed_days: i64, window_days: i64 },

    #[error("anchor index {index} out of range for series of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("series not sorted by date at index {index}")]
    Unsorted { index: usize },
}

/// Errors returned by the prediction mapper.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionError {
    #[error("game {appid} not found")]
    NotFound { appid: u32 },

    #[error("insufficient price history: required {required}, found {found}")]
    InsufficientHistory { required: usize, found: usize },

    #[error("batch of {requested} exceeds the maximum of {max} games per request")]
    BatchTooLarge { requested: usize, max: usize },

    #[error("repository error: {message}")]
    Repository { message: String },
}

impl From<anyhow::Error> for PredictionError {
    fn from(err: anyhow::Error) -> Self {
        PredictionError::Repository {
            message: format!("{:#}", err),
        }
    }
}

/// Errors raised while loading a serialized classifier.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    Invalid(String),
}

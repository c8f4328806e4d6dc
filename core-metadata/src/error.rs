use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Batch-fatal failures. Per-file problems are reported as
/// [`ExtractionError`] values inside the aggregate instead.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Failed to start extraction worker pool: {0}")]
    WorkerPool(#[source] std::io::Error),

    #[error("Extraction task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// What an extractor reports when it cannot produce metadata.
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// The file could not be opened or decoded.
    #[error("{0}")]
    Parse(String),

    /// The container parsed but its structure could not be mapped to fields.
    #[error("{0}")]
    Derive(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ExtractorError {
    pub fn parse(message: impl fmt::Display) -> Self {
        Self::Parse(message.to_string())
    }

    pub fn derive(message: impl fmt::Display) -> Self {
        Self::Derive(message.to_string())
    }
}

/// Failure categories attached to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    NotFound,
    UnsupportedType,
    Parse,
    Derive,
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExtractionErrorKind::NotFound => "not found",
            ExtractionErrorKind::UnsupportedType => "unsupported type",
            ExtractionErrorKind::Parse => "parse error",
            ExtractionErrorKind::Derive => "derive error",
        };
        f.write_str(label)
    }
}

/// A per-file failure carried as data in the aggregate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(ExtractionErrorKind::NotFound, "file not found")
    }

    /// `ext` is the lowercased extension without the dot, or `None`.
    pub fn unsupported(ext: Option<&str>) -> Self {
        let shown = match ext {
            Some(ext) if !ext.is_empty() => format!(".{}", ext),
            _ => "(none)".to_string(),
        };
        Self::new(
            ExtractionErrorKind::UnsupportedType,
            format!("unsupported file type: {}", shown),
        )
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::Parse, message)
    }

    pub fn derive(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::Derive, message)
    }
}

impl From<ExtractorError> for ExtractionError {
    fn from(err: ExtractorError) -> Self {
        match err {
            ExtractorError::Parse(message) => ExtractionError::parse(message),
            ExtractorError::Derive(message) => ExtractionError::derive(message),
            ExtractorError::Io(io) => ExtractionError::parse(io.to_string()),
        }
    }
}

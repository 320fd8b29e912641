/// Error taxonomy for generation, storage and export.
use std::fmt;
use thiserror::Error;

/// Malformed or out-of-range input, rejected before any work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("cell size {axis} must lie in (0, {max}], got {value}")]
    CellSizeOutOfRange {
        axis: char,
        value: f64,
        max: f64,
    },

    #[error("cell count {axis} must lie in [{min}, {max}], got {value}")]
    CellCountOutOfRange {
        axis: char,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("model has {total} cells, exceeding the ceiling of {max}")]
    TooManyCells { total: u64, max: u64 },

    #[error("model name must not be empty")]
    EmptyName,

    #[error("model name is {len} characters long, the limit is {max}")]
    NameTooLong { len: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded writing {key} ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("there are no blocks to export")]
    Empty,

    #[error("serialized model is {bytes} bytes, over the {max} byte export limit")]
    TooLarge { bytes: usize, max: usize },

    #[error("compression library unavailable")]
    ArchiverUnavailable,

    #[error("archive construction failed: {0}")]
    Archive(String),
}

#[derive(Debug, Error)]
#[error("pattern engine failed: {0}")]
pub struct PatternError(pub String);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("generation request {token} was superseded by request {latest}")]
    Superseded { token: u64, latest: u64 },

    #[error("no gallery model with id {0}")]
    UnknownGalleryModel(String),

    #[error("no model has been generated yet")]
    NoCurrentModel,
}

/// Non-fatal, user-visible outcome of a degraded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Persistent storage is full; the named data is kept in memory only.
    StorageExhausted { what: &'static str },
    /// The generated model was not memoized.
    NotCached { reason: NotCachedReason },
    /// The archive path failed and a plain CSV was produced instead.
    ExportFellBack { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotCachedReason {
    OverBudget { bytes: usize, max: usize },
    QuotaExhausted,
    Backend(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::StorageExhausted { what } => {
                write!(f, "storage is full, {what} could not be saved")
            }
            Notice::NotCached { reason } => match reason {
                NotCachedReason::OverBudget { bytes, max } => write!(
                    f,
                    "model not cached: {bytes} bytes exceeds the {max} byte cache budget"
                ),
                NotCachedReason::QuotaExhausted => {
                    write!(f, "model not cached: storage quota exhausted")
                }
                NotCachedReason::Backend(msg) => write!(f, "model not cached: {msg}"),
            },
            Notice::ExportFellBack { reason } => {
                write!(f, "exported uncompressed CSV ({reason})")
            }
        }
    }
}

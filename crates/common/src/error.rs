//! Common error types.

use thiserror::Error;

/// Main error type for the media layer.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Read-only: {0}")]
    ReadOnly(String),

    #[error("Index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    pub fn oom(msg: impl Into<String>) -> Self {
        Self::OutOfMemory(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnly(msg.into())
    }

    pub fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { index, len }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::WorkerUnavailable(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this is a concurrency-contract refusal rather than a failure.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

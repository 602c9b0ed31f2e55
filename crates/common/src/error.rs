//! Error types shared across Framecast crates.

use std::path::PathBuf;

/// Top-level error type for Framecast operations.
#[derive(Debug, thiserror::Error)]
pub enum FramecastError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Composition not found: {id}")]
    CompositionNotFound { id: String },

    #[error("Render timed out at frame {frame} after {attempts} attempts: {message}")]
    RenderTimeout {
        frame: u32,
        attempts: u32,
        message: String,
    },

    #[error("Encode failed: {message}")]
    EncodeFailed { message: String },

    #[error("Unknown codec: {id}")]
    UnknownCodec { id: String },

    #[error("Job cancelled: {job}")]
    JobCancelled { job: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramecastError.
pub type FramecastResult<T> = Result<T, FramecastError>;

impl FramecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
        }
    }

    pub fn composition_not_found(id: impl Into<String>) -> Self {
        Self::CompositionNotFound { id: id.into() }
    }

    pub fn render_timeout(frame: u32, attempts: u32, msg: impl Into<String>) -> Self {
        Self::RenderTimeout {
            frame,
            attempts,
            message: msg.into(),
        }
    }

    pub fn encode_failed(msg: impl Into<String>) -> Self {
        Self::EncodeFailed {
            message: msg.into(),
        }
    }

    pub fn unknown_codec(id: impl Into<String>) -> Self {
        Self::UnknownCodec { id: id.into() }
    }

    pub fn cancelled(job: impl Into<String>) -> Self {
        Self::JobCancelled { job: job.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error was caused by cooperative cancellation rather
    /// than a real failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::JobCancelled { .. })
    }

    /// Wrap this error with the identifier of the unit of work that hit it.
    pub fn in_unit(self, unit: impl std::fmt::Display) -> Self {
        match self {
            // Cancellation already names its job; re-wrapping would lose it.
            Self::JobCancelled { .. } => self,
            other => Self::Other(anyhow::anyhow!("{unit}: {other}")),
        }
    }
}

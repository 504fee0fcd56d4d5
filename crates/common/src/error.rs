//! Error types shared across QCut crates.

use std::path::PathBuf;

/// Top-level error type for QCut operations.
#[derive(Debug, thiserror::Error)]
pub enum QcutError {
    #[error("Timeline error: {message}")]
    Timeline { message: String },

    #[error("Planning error: {message}")]
    Planning { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Resource unavailable: {message}")]
    ResourceUnavailable { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using QcutError.
pub type QcutResult<T> = Result<T, QcutError>;

impl QcutError {
    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline {
            message: msg.into(),
        }
    }

    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn resource_unavailable(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error only affects a single element and the run may continue.
    pub fn is_element_level(&self) -> bool {
        matches!(
            self,
            Self::Render { .. }
                | Self::ResourceUnavailable { .. }
                | Self::Unsupported { .. }
                | Self::FileNotFound { .. }
        )
    }
}

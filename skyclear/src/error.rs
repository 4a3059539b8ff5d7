//! Error taxonomy for the streak removal engine.
//!
//! Per-group "no lines found" is not an error; it is the unset classification.
//! Everything here is either fatal for one frame (`Input`, `Malformed`,
//! `DimensionMismatch`, `Output`, `Stage`, `Task`), fatal at startup (`Config`), or
//! recoverable by the frame cache (`ResourceExhausted`).

use thiserror::Error;

use crate::core_modules::progress::FrameProcessingState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkyclearError {
    #[error("frame {frame}: {reason}")]
    Input { frame: usize, reason: String },

    /// Raw frame data that does not match its declared shape, before the frame it
    /// belongs to is known. The frame cache turns it into `Input`.
    #[error("malformed frame data: {0}")]
    Malformed(String),

    #[error("frame {frame}: dimensions {found:?} do not match expected {expected:?}")]
    DimensionMismatch { frame: usize, expected: (u32, u32), found: (u32, u32) },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("frame {frame}: resources exhausted: {reason}")]
    ResourceExhausted { frame: usize, reason: String },

    #[error("frame {frame}: illegal stage transition {from:?} -> {to:?}")]
    Stage { frame: usize, from: Option<FrameProcessingState>, to: FrameProcessingState },

    #[error("frame {frame}: failed to write output: {reason}")]
    Output { frame: usize, reason: String },

    #[error("worker task failed: {0}")]
    Task(String),
}

impl SkyclearError {
    pub fn input(frame: usize, reason: impl Into<String>) -> Self {
        Self::Input { frame, reason: reason.into() }
    }

    /// Attaches `frame` to an error raised without one.
    pub fn for_frame(self, frame: usize) -> Self {
        match self {
            Self::Malformed(reason) => Self::Input { frame, reason },
            other => other,
        }
    }

    /// Whether the frame cache may evict and retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}

impl From<tokio::task::JoinError> for SkyclearError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SkyclearError>;

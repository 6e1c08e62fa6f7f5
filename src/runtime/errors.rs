//! Error types for a decode or synthesis pass

use crossbeam_channel::SendError;

/// Error type for work performed during a pass
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    /// The cursor ran past the last captured transition. Ends a pass normally.
    #[error("No more transitions in captured data")]
    EndOfData,

    #[error("Failed to send to output channel: {0}")]
    SendError(String),

    /// Internal state left its defined set. Fatal to the current pass.
    #[error("Invalid decoder state: {0}")]
    InvalidState(String),
}

impl<T> From<SendError<T>> for WorkError {
    fn from(e: SendError<T>) -> Self {
        WorkError::SendError(format!("{}", e))
    }
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;

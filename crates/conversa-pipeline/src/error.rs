//! Error taxonomy
//!
//! Internal errors are rich, per-module `thiserror` enums. Anything that
//! crosses into peer-visible territory (a data-channel `error` message, an
//! `Error` frame, an HTTP response) is mapped through [`ErrorKind`] — the six
//! kinds from the error handling design — so the recovery policy table stays
//! a single source of truth instead of being re-derived ad hoc at each call
//! site.

pub use crate::frame::ErrorKind;

/// Errors raised inside the stage runtime itself (as opposed to errors
/// surfaced by a specific stage's own error enum, which embeds into this
/// one via `Other`).
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error("invalid input: expected {expected}, got {actual}")]
    InvalidInput { expected: &'static str, actual: &'static str },

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Classify this error for the retry/abort policy in the stage runtime.
    /// Transient errors get exponential backoff up to a per-stage budget;
    /// everything else aborts the current turn immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, StageError::ResourceExhausted(_))
    }

    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            StageError::ProcessingFailed(_) => ErrorKind::InternalInvariant,
            StageError::InvalidInput { .. } => ErrorKind::BadInput,
            StageError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            StageError::ResourceExhausted(_) => ErrorKind::TransientNetwork,
            StageError::Other(_) => ErrorKind::InternalInvariant,
        }
    }
}

/// Errors from a provider adapter (STT/LLM/TTS/Memory/Vision). Each provider
/// crate can define a richer local enum; adapters inside this crate map into
/// this shared shape so the pipeline doesn't need to know provider internals.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider rejected input: {0}")]
    BadInput(String),

    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            ProviderError::Unavailable(_) => ErrorKind::ProviderUnavailable,
            ProviderError::Timeout(_) => ErrorKind::DeadlineExceeded,
            ProviderError::BadInput(_) => ErrorKind::BadInput,
            ProviderError::Transport(_) => ErrorKind::TransientNetwork,
        }
    }
}

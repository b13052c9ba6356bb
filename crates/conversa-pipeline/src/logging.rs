//! Logging
//!
//! Structured `tracing` output, configurable between a human-readable
//! pretty format for local development and newline-delimited JSON for
//! production log pipelines. Session and turn ids are attached as span
//! fields by callers (`tracing::info_span!("session", id = %session_id)`)
//! rather than interpolated into the message text, so they stay queryable
//! in the JSON form.

use crate::config::LogConfigToml;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Installs the process-wide tracing subscriber. Must be called at most
/// once; the server binary calls this first thing in `main`.
pub fn init(config: &LogConfigToml) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|_| LoggingError::InvalidLevel(config.level.clone()))?;

    let result = match config.format.as_str() {
        "json" => fmt().with_env_filter(filter).json().try_init(),
        _ => fmt().with_env_filter(filter).try_init(),
    };

    result.map_err(|_| LoggingError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_is_rejected_before_touching_the_global_subscriber() {
        let config = LogConfigToml { level: "not-a-level!!".into(), format: "pretty".into() };
        let err = init(&config).unwrap_err();
        assert!(matches!(err, LoggingError::InvalidLevel(_)));
    }
}

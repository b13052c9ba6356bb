//! Transport error taxonomy, mapped into the shared peer-visible
//! [`conversa_pipeline::ErrorKind`] at the boundary where this crate's
//! errors become visible outside the process.

use conversa_pipeline::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid SDP: {0}")]
    Sdp(String),

    #[error("ice error: {0}")]
    Ice(String),

    #[error("data channel error: {0}")]
    DataChannel(String),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("no active session for id {0}")]
    UnknownSession(String),
}

impl TransportError {
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            TransportError::Sdp(_) => ErrorKind::BadInput,
            TransportError::Ice(_) => ErrorKind::TransientNetwork,
            TransportError::DataChannel(_) => ErrorKind::TransientNetwork,
            TransportError::UnsupportedCodec(_) => ErrorKind::PolicyViolation,
            TransportError::UnknownSession(_) => ErrorKind::BadInput,
        }
    }
}

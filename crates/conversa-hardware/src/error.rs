use conversa_pipeline::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("hardware channel unavailable: {0}")]
    Unavailable(String),

    #[error("hardware command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("hardware rejected command: {0}")]
    Rejected(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid tool arguments: {0}")]
    BadArguments(String),
}

impl HardwareError {
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            HardwareError::Unavailable(_) => ErrorKind::ProviderUnavailable,
            HardwareError::Timeout(_) => ErrorKind::DeadlineExceeded,
            HardwareError::Rejected(_) => ErrorKind::PolicyViolation,
            HardwareError::UnknownTool(_) | HardwareError::BadArguments(_) => ErrorKind::BadInput,
        }
    }
}

/// Typed error hierarchy for the assistant-service boundary.
/// Classifies errors as fatal (give up on the turn), retryable, or operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AgentError {
    // Fatal: the turn cannot proceed
    #[error("failed to launch assistant process: {0}")]
    LaunchFailed(String),
    #[error("invalid turn request: {0}")]
    InvalidRequest(String),

    // Retryable
    #[error("assistant protocol error: {0}")]
    Protocol(String),
    #[error("assistant stream interrupted: {0}")]
    Interrupted(String),
    #[error("io error: {0}")]
    Io(String),

    // Operational
    #[error("turn cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Interrupted(_) | Self::Io(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LaunchFailed(_) | Self::InvalidRequest(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::LaunchFailed(_) => "launch_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Protocol(_) => "protocol",
            Self::Interrupted(_) => "interrupted",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(AgentError::Protocol("bad line".into()).is_retryable());
        assert!(AgentError::Interrupted("eof".into()).is_retryable());
        assert!(AgentError::Io("pipe".into()).is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(AgentError::LaunchFailed("no such file".into()).is_fatal());
        assert!(AgentError::InvalidRequest("empty prompt".into()).is_fatal());
        assert!(!AgentError::Interrupted("eof".into()).is_fatal());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(AgentError::Cancelled.error_kind(), "cancelled");
        assert_eq!(AgentError::LaunchFailed("x".into()).error_kind(), "launch_failed");
        assert_eq!(AgentError::Protocol("x".into()).error_kind(), "protocol");
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err: AgentError = io.into();
        assert!(matches!(err, AgentError::Io(_)));
        assert!(err.to_string().contains("broken pipe"));
    }
}

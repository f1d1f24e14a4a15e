use broker_core::{FailureKind, ToolCallResult};
use thiserror::Error;

/// Failures raised while speaking to a provider. On the call path
/// [`crate::TransportAdapter`] folds every variant into a failed
/// [`ToolCallResult`]; tool listing returns it as is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no built-in provider registered as '{provider_id}'")]
    ProviderNotFound { provider_id: String },

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("no terminal response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("call cancelled by caller")]
    Cancelled,
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    pub fn transport(reason: impl Into<String>) -> Self {
        TransportError::Transport {
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        TransportError::Protocol {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::ProviderNotFound { .. } => FailureKind::ProviderNotFound,
            TransportError::Transport { .. } => FailureKind::TransportError,
            TransportError::Timeout { .. } => FailureKind::Timeout,
            TransportError::Protocol { .. } => FailureKind::ProtocolError,
            TransportError::ToolFailed { .. } => FailureKind::ToolFailed,
            TransportError::Cancelled => FailureKind::Cancelled,
        }
    }
}

impl From<TransportError> for ToolCallResult {
    fn from(err: TransportError) -> Self {
        ToolCallResult::failure(err.kind(), err.to_string())
    }
}

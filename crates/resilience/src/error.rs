//! Remote call error types.

use thiserror::Error;

/// Returned by a breaker that refuses to forward a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit breaker '{breaker}' is open")]
pub struct CircuitOpenError {
    pub breaker: String,
}

/// Failures surfaced by the resilient remote client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// A round trip exceeded its per-attempt deadline.
    #[error("{service}: request timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    /// The caller's overall deadline had already passed; nothing was sent.
    #[error("{service}: deadline exceeded before the request was sent")]
    DeadlineExceeded { service: String },

    /// The peer answered with a status outside the accepted set.
    #[error("{service}: unexpected status code {status}")]
    UnexpectedStatus { service: String, status: u16 },

    /// The response body did not have the expected shape.
    #[error("{service}: failed to decode response: {reason}")]
    Decode { service: String, reason: String },

    /// The peer could not be reached.
    #[error("{service}: transport error: {reason}")]
    Transport { service: String, reason: String },

    /// The breaker short-circuited the call.
    #[error("{service}: circuit breaker is open")]
    CircuitOpen { service: String },
}

impl RemoteError {
    /// Returns true if another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RemoteError::CircuitOpen { .. } | RemoteError::DeadlineExceeded { .. }
        )
    }

    /// Returns true if the breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RemoteError::CircuitOpen { .. })
    }

    /// Returns the name of the dependency that failed.
    pub fn service(&self) -> &str {
        match self {
            RemoteError::Timeout { service, .. }
            | RemoteError::DeadlineExceeded { service }
            | RemoteError::UnexpectedStatus { service, .. }
            | RemoteError::Decode { service, .. }
            | RemoteError::Transport { service, .. }
            | RemoteError::CircuitOpen { service } => service,
        }
    }

    /// Returns a short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Timeout { .. } => "timeout",
            RemoteError::DeadlineExceeded { .. } => "deadline_exceeded",
            RemoteError::UnexpectedStatus { .. } => "unexpected_status",
            RemoteError::Decode { .. } => "decode",
            RemoteError::Transport { .. } => "transport",
            RemoteError::CircuitOpen { .. } => "circuit_open",
        }
    }
}

impl From<CircuitOpenError> for RemoteError {
    fn from(err: CircuitOpenError) -> Self {
        RemoteError::CircuitOpen {
            service: err.breaker,
        }
    }
}

/// Convenience type alias for remote call results.
pub type Result<T> = std::result::Result<T, RemoteError>;

//! Kafka Connect client error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`ConnectClient`](super::ConnectClient) calls.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Network-level failure (connection refused, reset, DNS, TLS handshake).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The per-call deadline elapsed before a response was read.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The call was abandoned because the process is shutting down.
    #[error("request cancelled")]
    Cancelled,

    /// Non-2xx response, with the raw body text as returned by the server.
    #[error("unexpected status code {status}: {body}")]
    Application { status: u16, body: String },

    /// The connector does not exist.
    #[error("connector not found: {0}")]
    NotFound(String),

    /// A 2xx response whose body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request could not be built (bad base URL, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification used for condition reasons and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    Cancelled,
    /// Non-2xx that is expected to clear on its own (5xx, 408, 409, 429).
    Transient,
    /// Non-2xx caused by the request itself; retrying unchanged will not help.
    Configuration,
    NotFound,
    Decode,
}

impl ErrorClass {
    /// Condition reason string for this class.
    pub fn reason(&self) -> &'static str {
        match self {
            ErrorClass::Transport => "TransportError",
            ErrorClass::Cancelled => "Cancelled",
            ErrorClass::Transient => "ApplicationError",
            ErrorClass::Configuration => "ConfigurationError",
            ErrorClass::NotFound => "NotFound",
            ErrorClass::Decode => "DecodeError",
        }
    }
}

impl ConnectError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ConnectError::Transport { .. } | ConnectError::Timeout(_) => ErrorClass::Transport,
            ConnectError::Cancelled => ErrorClass::Cancelled,
            ConnectError::Application { status, .. } => {
                if is_transient_status(*status) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Configuration
                }
            }
            ConnectError::NotFound(_) => ErrorClass::NotFound,
            ConnectError::Decode(_) => ErrorClass::Decode,
            ConnectError::InvalidRequest(_) => ErrorClass::Configuration,
        }
    }

    /// Whether the same call may succeed if retried later.
    ///
    /// Decode failures count as retryable: a malformed success body means the
    /// server misbehaved, not that our request was wrong.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Transport | ErrorClass::Transient | ErrorClass::Decode
        )
    }

    /// 409 from the server. Workers answer 409 both for a duplicate name and
    /// while a rebalance is in progress.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConnectError::Application { status: 409, .. })
    }

    /// 409 whose body names an existing connector, as opposed to a rebalance.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ConnectError::Application { status: 409, body } if body.contains("already exists"))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectError::Cancelled)
    }
}

fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 409 || status == 429
}

/// Result type for Kafka Connect calls.
pub type Result<T> = std::result::Result<T, ConnectError>;

//! Error types for chatrelay
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for chatrelay operations
///
/// The variants form a stable taxonomy that callers can match on after
/// downcasting an `anyhow::Error`:
///
/// ```
/// use chatrelay::error::ChatRelayError;
///
/// let err: anyhow::Error = ChatRelayError::Cancelled.into();
/// assert!(matches!(
///     err.downcast_ref::<ChatRelayError>(),
///     Some(ChatRelayError::Cancelled)
/// ));
/// ```
#[derive(Error, Debug)]
pub enum ChatRelayError {
    /// Missing endpoint, unknown provider, or an otherwise invalid setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider rejected the API key (HTTP 401)
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The key is valid but not allowed to use this resource (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rejected by the local rate window or by a remote 429
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Human-readable explanation
        message: String,
        /// Milliseconds until the local window resets, when known
        retry_after_ms: Option<u64>,
    },

    /// The request did not settle before the configured timeout
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed
        timeout_ms: u64,
    },

    /// The caller aborted the request
    #[error("Request cancelled")]
    Cancelled,

    /// 5xx responses, or a local server that is not ready
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    /// The provider returned no choices or candidates
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// The provider refused to answer for content-safety reasons
    #[error("Blocked by safety filter: {0}")]
    SafetyBlocked(String),

    /// The retry budget was spent
    #[error("Request failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Total number of attempts made
        attempts: u32,
        /// Message of the final failure
        last_error: String,
    },

    /// Any other non-success status from a provider
    #[error("Provider error: {0}")]
    Provider(String),

    /// Connection-level failures (DNS, refused, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with a body we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl ChatRelayError {
    /// Whether the explicit retry helper may re-send after this error
    ///
    /// Only generic network and server failures qualify. Credential,
    /// safety, cancellation and local rate-limit errors never do.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::error::ChatRelayError;
    ///
    /// assert!(ChatRelayError::ServerUnavailable("502".into()).is_retryable());
    /// assert!(!ChatRelayError::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServerUnavailable(_) | Self::Network(_) | Self::Timeout { .. }
        )
    }

    /// Short, stable label used for metrics and log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::ServerUnavailable(_) => "server_unavailable",
            Self::EmptyResponse(_) => "empty_response",
            Self::SafetyBlocked(_) => "safety_blocked",
            Self::Exhausted { .. } => "exhausted",
            Self::Provider(_) => "provider",
            Self::Network(_) => "network",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Storage(_) => "storage",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Yaml(_) => "yaml",
            Self::Http(_) => "http",
            Self::Keyring(_) => "keyring",
        }
    }
}

/// Classify an `anyhow::Error` produced by this crate
///
/// Returns `None` for errors that did not originate as a [`ChatRelayError`].
pub fn classify(err: &anyhow::Error) -> Option<&ChatRelayError> {
    err.downcast_ref::<ChatRelayError>()
}

/// Result type alias for chatrelay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

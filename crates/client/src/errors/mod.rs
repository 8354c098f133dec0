//! Error types and failure classification for the request layer.
//!
//! This module provides:
//! - [`TransportError`]: the raw failure of a single attempt
//! - [`NetworkErrorType`] and [`ClassifiedError`]: the normalized taxonomy
//! - [`classify`]: the pure mapping from the former to the latter
//! - [`DecodeError`], [`RequestError`], [`RequestFailure`]: what callers see
//! - [`ConfigError`]: configuration loading failures

mod classifier;
mod taxonomy;

pub use classifier::{classify, DEFAULT_RATE_LIMIT_DELAY};
pub(crate) use classifier::is_dns_message;
pub use taxonomy::{ClassifiedError, NetworkErrorType};

use std::time::Duration;

use thiserror::Error;

use crate::models::RetryInfo;

/// Raw failure of one attempt, before classification.
///
/// Non-2xx responses are reported as [`TransportError::Status`] so the executor
/// never has to inspect response bytes to decide success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The attempt lost the race against its timeout.
    #[error("Request timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// The HTTP stack's own timeout fired; its duration is not known here.
    #[error("Request timed out: {0}")]
    TransportTimeout(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Parsed `Retry-After` header, when present.
        retry_after: Option<Duration>,
    },

    /// The host name could not be resolved.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// No connection could be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The request was rejected by a cross-origin policy.
    #[error("Cross-origin request blocked: {0}")]
    Cors(String),

    /// The local circuit breaker refused to dispatch the request.
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// Anything else the transport reported.
    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Create a status error without a `Retry-After` hint.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided `Retry-After` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A successful response whose body could not be decoded.
///
/// Kept outside the retry taxonomy: the transport call succeeded, so retrying
/// would only fetch the same body again.
#[derive(Error, Debug)]
#[error("Failed to decode response body (status {status}): {source}")]
pub struct DecodeError {
    pub status: u16,
    #[source]
    pub source: serde_json::Error,
}

/// Why a request produced no data.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The transport call failed (or was never dispatched).
    #[error(transparent)]
    Network(#[from] ClassifiedError),

    /// The transport call succeeded but its body was not decodable.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl RequestError {
    /// The classified network error, when this is a network failure.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Network(error) => Some(error),
            Self::Decode(_) => None,
        }
    }
}

/// Error returned by [`ApiResponse::into_result`](crate::ApiResponse::into_result).
///
/// Carries the underlying error together with the retry diagnostics of the call.
#[derive(Error, Debug)]
#[error("Request failed after {} attempt(s): {error}", .retry_info.attempts)]
pub struct RequestFailure {
    #[source]
    pub error: RequestError,
    pub retry_info: RetryInfo,
}

/// Errors that can occur while loading client configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ConfigError {
    pub(crate) fn invalid_value(key: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure categories produced by the classifier.
///
/// # Behavior Summary
///
/// | Type | Retryable |
/// |------|-----------|
/// | `ConnectionTimeout` | Yes |
/// | `ServerError` | Yes |
/// | `ServiceUnavailable` | Yes |
/// | `RateLimited` | Yes (longer suggested wait) |
/// | `ClientError` | No |
/// | `DnsResolutionFailed` | Yes |
/// | `CorsError` | No |
/// | `NetworkUnreachable` | Yes |
/// | `Unknown` | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkErrorType {
    /// The attempt did not complete before its timeout fired.
    ConnectionTimeout,
    /// The server answered with a 5xx status.
    ServerError,
    /// The server answered 503, or the local circuit breaker is open.
    ServiceUnavailable,
    /// The server answered 429.
    RateLimited,
    /// The server answered with a 4xx status other than 429.
    ClientError,
    /// The host name could not be resolved.
    DnsResolutionFailed,
    /// The request was rejected by a cross-origin policy.
    CorsError,
    /// No response reached the transport.
    NetworkUnreachable,
    /// Anything the classifier does not recognize.
    Unknown,
}

impl NetworkErrorType {
    /// Whether re-attempting the same request has a reasonable chance of succeeding.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::ClientError | Self::CorsError)
    }

    /// Wire name of the taxonomy value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::ServerError => "SERVER_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::RateLimited => "RATE_LIMITED",
            Self::ClientError => "CLIENT_ERROR",
            Self::DnsResolutionFailed => "DNS_RESOLUTION_FAILED",
            Self::CorsError => "CORS_ERROR",
            Self::NetworkUnreachable => "NETWORK_UNREACHABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub(crate) fn user_message(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "The request took too long to complete.",
            Self::ServerError => "The server ran into a problem handling the request.",
            Self::ServiceUnavailable => "The service is temporarily unavailable.",
            Self::RateLimited => "Too many requests were sent in a short period.",
            Self::ClientError => "The request could not be processed.",
            Self::DnsResolutionFailed => "The server address could not be found.",
            Self::CorsError => "The request was blocked by the server's access policy.",
            Self::NetworkUnreachable => "Unable to reach the server.",
            Self::Unknown => "An unexpected network error occurred.",
        }
    }

    pub(crate) fn suggested_action(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "Check your connection and try again.",
            Self::ServerError => "Try again in a few moments.",
            Self::ServiceUnavailable => "Wait a moment, then try again.",
            Self::RateLimited => "Wait before sending more requests.",
            Self::ClientError => "Review the request and contact support if the problem persists.",
            Self::DnsResolutionFailed => "Check your network settings and the server address.",
            Self::CorsError => "Contact support.",
            Self::NetworkUnreachable => "Check your internet connection.",
            Self::Unknown => "Try again, and contact support if the problem persists.",
        }
    }
}

impl std::fmt::Display for NetworkErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized description of a failed attempt.
///
/// Created by [`classify`](super::classify) for every raw failure and attached to
/// the attempt record and the final outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Error)]
#[error("{error_type}: {technical_message}")]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    #[serde(rename = "type")]
    pub error_type: NetworkErrorType,
    pub status_code: Option<u16>,
    pub is_retryable: bool,
    /// Short message suitable for end users.
    pub user_message: String,
    /// Original error text plus status, for logs.
    pub technical_message: String,
    pub suggested_action: String,
    pub timestamp: DateTime<Utc>,
    /// Correlation id of the logical call.
    pub request_id: String,
    /// Minimum wait the server asked for (or the default for rate limiting).
    pub retry_after_ms: Option<u64>,
}

impl ClassifiedError {
    /// Minimum wait before the next attempt, if the failure suggested one.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

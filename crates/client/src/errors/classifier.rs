//! Maps raw attempt failures onto the [`NetworkErrorType`] taxonomy.

use std::time::Duration;

use chrono::Utc;

use super::{ClassifiedError, NetworkErrorType, TransportError};
use crate::correlation::generate_request_id;

/// Wait suggested for a 429 that carried no `Retry-After` header.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(5);

const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name resolution",
    "name or service not known",
    "no such host",
    "nodename nor servname",
    "enotfound",
];

const CORS_MARKERS: &[&str] = &["cors", "cross-origin", "opaque response"];

const NETWORK_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "network is unreachable",
    "host is unreachable",
    "broken pipe",
    "error trying to connect",
    "failed to fetch",
    "network error",
];

/// Classify a raw failure.
///
/// `status_code` takes precedence over any status carried by `error`. `url` is
/// only used to compose the technical message. When `request_id` is `None` a
/// fresh correlation id is generated.
///
/// Never fails: anything unrecognized becomes [`NetworkErrorType::Unknown`],
/// which is retryable.
pub fn classify(
    error: &TransportError,
    status_code: Option<u16>,
    url: Option<&str>,
    request_id: Option<&str>,
) -> ClassifiedError {
    let status = status_code.or_else(|| error.status_code());
    let error_type = classify_type(error, status);

    let retry_after = match error_type {
        NetworkErrorType::RateLimited => {
            Some(error.retry_after().unwrap_or(DEFAULT_RATE_LIMIT_DELAY))
        }
        NetworkErrorType::ServiceUnavailable => error.retry_after(),
        _ => None,
    };

    ClassifiedError {
        error_type,
        status_code: status,
        is_retryable: error_type.is_retryable(),
        user_message: error_type.user_message().to_string(),
        technical_message: technical_message(error, status, url),
        suggested_action: error_type.suggested_action().to_string(),
        timestamp: Utc::now(),
        request_id: request_id
            .map(str::to_string)
            .unwrap_or_else(generate_request_id),
        retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
    }
}

fn classify_type(error: &TransportError, status: Option<u16>) -> NetworkErrorType {
    match (error, status) {
        (TransportError::TimedOut(_) | TransportError::TransportTimeout(_), _) => {
            NetworkErrorType::ConnectionTimeout
        }
        (TransportError::CircuitOpen, _) => NetworkErrorType::ServiceUnavailable,
        (_, Some(503)) => NetworkErrorType::ServiceUnavailable,
        (_, Some(429)) => NetworkErrorType::RateLimited,
        (_, Some(s)) if (500..600).contains(&s) => NetworkErrorType::ServerError,
        (_, Some(s)) if (400..500).contains(&s) => NetworkErrorType::ClientError,
        (TransportError::Dns(_), _) => NetworkErrorType::DnsResolutionFailed,
        (TransportError::Cors(_), _) => NetworkErrorType::CorsError,
        (TransportError::Connect(message), _) => {
            if is_dns_message(message) {
                NetworkErrorType::DnsResolutionFailed
            } else {
                NetworkErrorType::NetworkUnreachable
            }
        }
        (TransportError::Other(message), _) => classify_message(message),
        _ => NetworkErrorType::Unknown,
    }
}

fn classify_message(message: &str) -> NetworkErrorType {
    let lower = message.to_ascii_lowercase();
    if DNS_MARKERS.iter().any(|m| lower.contains(m)) {
        NetworkErrorType::DnsResolutionFailed
    } else if CORS_MARKERS.iter().any(|m| lower.contains(m)) {
        NetworkErrorType::CorsError
    } else if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        NetworkErrorType::NetworkUnreachable
    } else {
        NetworkErrorType::Unknown
    }
}

/// Whether an error message describes a name-resolution failure.
pub(crate) fn is_dns_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    DNS_MARKERS.iter().any(|m| lower.contains(m))
}

fn technical_message(error: &TransportError, status: Option<u16>, url: Option<&str>) -> String {
    let mut message = error.to_string();
    if let Some(status) = status {
        message.push_str(&format!(" (status {})", status));
    }
    if let Some(url) = url {
        message.push_str(&format!(" while requesting {}", url));
    }
    message
}

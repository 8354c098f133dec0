//! Plain data carried through a single logical call.

use std::time::Duration;

use reqwest::Method;
use serde::{Serialize, Serializer};

/// Identity of one logical call. Created per call and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub url: String,
    pub method: Method,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(url: impl Into<String>, method: Method, correlation_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            correlation_id: correlation_id.into(),
        }
    }
}

/// Retry diagnostics attached to every [`ApiResponse`](crate::ApiResponse).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryInfo {
    /// Number of recorded (failed) attempts.
    pub attempts: usize,
    #[serde(rename = "totalTimeMs", serialize_with = "serialize_millis")]
    pub total_time: Duration,
    pub circuit_breaker_tripped: bool,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

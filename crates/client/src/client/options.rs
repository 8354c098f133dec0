use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;

use crate::errors::{ClassifiedError, RequestError, RequestFailure};
use crate::models::RetryInfo;

/// Per-call options for [`ResilientClient::request`](super::ResilientClient::request).
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Exactly one attempt, no breaker, no backoff.
    pub skip_retry: bool,
    /// Replaces the client's per-attempt timeout.
    pub custom_timeout: Option<Duration>,
    /// Replaces the client's max attempts for this call.
    pub max_retries: Option<u32>,
    /// Pin the correlation id instead of generating one.
    pub correlation_id: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            skip_retry: false,
            custom_timeout: None,
            max_retries: None,
            correlation_id: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header. Invalid names or values are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => log::warn!("Ignoring invalid header '{}'", name),
        }
        self
    }

    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.custom_timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Uniform caller-facing envelope for one logical call.
#[derive(Debug)]
pub struct ApiResponse<T> {
    outcome: Result<T, RequestError>,
    pub retry_info: RetryInfo,
    /// Correlation id the call was logged under.
    pub correlation_id: String,
}

impl<T> ApiResponse<T> {
    pub(crate) fn new(
        outcome: Result<T, RequestError>,
        retry_info: RetryInfo,
        correlation_id: String,
    ) -> Self {
        Self {
            outcome,
            retry_info,
            correlation_id,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Decoded body; `None` on failure.
    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.outcome.as_ref().err()
    }

    /// The classified network error, if the call failed in transport.
    pub fn classified_error(&self) -> Option<&ClassifiedError> {
        self.error().and_then(RequestError::classified)
    }

    pub fn into_data(self) -> Option<T> {
        self.outcome.ok()
    }

    /// Compatibility accessor for error-returning call sites.
    ///
    /// The error carries the classified (or decode) error and the retry info.
    pub fn into_result(self) -> Result<T, RequestFailure> {
        let retry_info = self.retry_info;
        self.outcome
            .map_err(|error| RequestFailure { error, retry_info })
    }
}

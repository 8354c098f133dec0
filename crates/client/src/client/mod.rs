//! Resilient HTTP client.
//!
//! The client turns one HTTP intent into an operation for the retry executor
//! and turns the executor's [`RetryResult`] back into an [`ApiResponse`]:
//! 1. Resolve the URL, headers, correlation id, and effective retry policy
//! 2. Log the request with sensitive fields redacted
//! 3. Run the transport call through the executor (or once, with `skip_retry`)
//! 4. Decode the body on success; classify on failure
//! 5. Log the response or error and record one metric for the call

mod options;
mod transport;

pub use options::{ApiResponse, RequestOptions};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

use std::sync::Arc;

use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::correlation::{IdGenerator, TimestampIdGenerator};
use crate::errors::{classify, DecodeError, RequestError, TransportError};
use crate::models::RequestContext;
use crate::resilience::{
    CircuitBreaker, CircuitSnapshot, CircuitState, RetryConfig, RetryExecutor, RetryResult,
};
use crate::telemetry::{
    redact_headers, redact_json, LogRequestLogger, MetricDetails, MetricsRecorder,
    NoopMetricsRecorder, RequestLogger,
};

/// Header carrying the correlation id to the server.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP client with retries, backoff, circuit breaking, and error classification.
///
/// Each client owns one circuit breaker shared by all of its concurrent calls.
pub struct ResilientClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    executor: RetryExecutor,
    logger: Arc<dyn RequestLogger>,
    metrics: Arc<dyn MetricsRecorder>,
    ids: Arc<dyn IdGenerator>,
}

impl ResilientClient {
    /// Create a client backed by [`ReqwestTransport`].
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client with a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let breaker = Arc::new(CircuitBreaker::with_config(config.breaker.clone()));
        Self {
            config,
            transport,
            executor: RetryExecutor::new(breaker),
            logger: Arc::new(LogRequestLogger),
            metrics: Arc::new(NoopMetricsRecorder),
            ids: Arc::new(TimestampIdGenerator),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue one logical call.
    ///
    /// Never returns an error directly: failures are reported through the
    /// envelope. Use [`ApiResponse::into_result`] for `?`-style call sites.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ApiResponse<T> {
        let started = Instant::now();
        let correlation_id = options
            .correlation_id
            .clone()
            .unwrap_or_else(|| self.ids.next_id());
        let url = self.resolve_url(endpoint);
        let method = options.method.clone();
        let retry = self.retry_config_for(&options);
        let headers = self.build_headers(&options, &correlation_id);
        let context = RequestContext::new(url.clone(), method.clone(), correlation_id.clone());

        let logged_body = options.body.as_ref().map(redact_json);
        self.logger.log_request(
            &url,
            &method,
            &correlation_id,
            &redact_headers(&headers),
            logged_body.as_ref(),
        );

        let request = TransportRequest {
            method: method.clone(),
            url: url.clone(),
            headers,
            body: options.body.as_ref().map(|body| body.to_string().into_bytes()),
        };
        let transport = &self.transport;
        let operation = || {
            let request = request.clone();
            async move {
                let response = transport.send(request).await?;
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(response.into_status_error())
                }
            }
        };

        let result = if options.skip_retry {
            self.executor.execute_once(operation, &retry, &context).await
        } else {
            self.executor
                .execute_with_retry(operation, &retry, &context)
                .await
        };

        let retry_info = result.retry_info();
        let RetryResult {
            data,
            error,
            circuit_breaker_tripped,
            ..
        } = result;

        let (outcome, status, error_type) = match data {
            Some(response) => {
                let status = response.status.as_u16();
                self.logger
                    .log_response(&url, &method, &correlation_id, status, started.elapsed());

                let decoded = decode::<T>(&response).map_err(|e| {
                    warn!("[{}] {}", correlation_id, e);
                    RequestError::Decode(e)
                });
                (decoded, Some(status), None)
            }
            None => {
                let classified = error.unwrap_or_else(|| {
                    let raw = if circuit_breaker_tripped {
                        TransportError::CircuitOpen
                    } else {
                        TransportError::Other("request failed without a recorded error".to_string())
                    };
                    classify(&raw, None, Some(&url), Some(&correlation_id))
                });
                self.logger.log_network_error(
                    &url,
                    &method,
                    &correlation_id,
                    &classified,
                    &retry_info,
                );

                let status = classified.status_code;
                let error_type = Some(classified.error_type);
                (Err(RequestError::Network(classified)), status, error_type)
            }
        };

        self.metrics.record_metric(
            endpoint,
            &method,
            started.elapsed(),
            status,
            &MetricDetails {
                retry_attempts: retry_info.attempts,
                total_time: retry_info.total_time,
                error: error_type,
            },
        );

        ApiResponse::new(outcome, retry_info, correlation_id)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResponse<T> {
        self.request(endpoint, RequestOptions::new(Method::GET)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> ApiResponse<T> {
        self.request(endpoint, RequestOptions::new(Method::POST).json(body))
            .await
    }

    pub async fn put<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> ApiResponse<T> {
        self.request(endpoint, RequestOptions::new(Method::PUT).json(body))
            .await
    }

    pub async fn patch<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> ApiResponse<T> {
        self.request(endpoint, RequestOptions::new(Method::PATCH).json(body))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResponse<T> {
        self.request(endpoint, RequestOptions::new(Method::DELETE))
            .await
    }

    pub fn circuit_breaker_state(&self) -> CircuitState {
        self.executor.circuit_breaker().state()
    }

    pub fn circuit_breaker_failure_count(&self) -> u32 {
        self.executor.circuit_breaker().failure_count()
    }

    pub fn circuit_breaker_snapshot(&self) -> CircuitSnapshot {
        self.executor.circuit_breaker().snapshot()
    }

    /// Force the breaker back to Closed.
    pub fn reset_circuit_breaker(&self) {
        self.executor.circuit_breaker().reset();
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL.
    fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Per-call overrides replace the client defaults.
    fn retry_config_for(&self, options: &RequestOptions) -> RetryConfig {
        let mut retry = self.config.retry.clone();
        if let Some(timeout) = options.custom_timeout {
            retry.timeout = timeout;
        }
        if let Some(max_retries) = options.max_retries {
            retry.max_attempts = max_retries;
        }
        retry
    }

    fn build_headers(&self, options: &RequestOptions, correlation_id: &str) -> HeaderMap {
        let mut headers = self.config.default_headers.clone();
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        if options.body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for name in options.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &options.headers {
            headers.append(name.clone(), value.clone());
        }

        match HeaderValue::from_str(correlation_id) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            Err(_) => warn!(
                "Correlation id '{}' is not a valid header value, not sending it",
                correlation_id
            ),
        }
        headers
    }
}

/// Decode a successful body as JSON. An empty body decodes as `null`.
fn decode<T: DeserializeOwned>(response: &TransportResponse) -> Result<T, DecodeError> {
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|source| DecodeError {
        status: response.status.as_u16(),
        source,
    })
}

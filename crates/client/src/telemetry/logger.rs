//! Structured request/response/error logging collaborator.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Method;
use serde_json::Value;

use crate::errors::ClassifiedError;
use crate::models::RetryInfo;

const LOG_TARGET: &str = "steadfast::http";

/// Receives one line per request, response, and network error, keyed by
/// correlation id. Headers and bodies arrive already redacted.
pub trait RequestLogger: Send + Sync {
    fn log_request(
        &self,
        url: &str,
        method: &Method,
        correlation_id: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
    );

    fn log_response(
        &self,
        url: &str,
        method: &Method,
        correlation_id: &str,
        status: u16,
        duration: Duration,
    );

    fn log_network_error(
        &self,
        url: &str,
        method: &Method,
        correlation_id: &str,
        error: &ClassifiedError,
        diagnostics: &RetryInfo,
    );
}

/// Default logger writing through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRequestLogger;

impl RequestLogger for LogRequestLogger {
    fn log_request(
        &self,
        url: &str,
        method: &Method,
        correlation_id: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
    ) {
        info!(target: LOG_TARGET, "[{}] --> {} {}", correlation_id, method, url);
        debug!(
            target: LOG_TARGET,
            "[{}] headers={:?} body={}",
            correlation_id,
            headers,
            body.map(Value::to_string).unwrap_or_default()
        );
    }

    fn log_response(
        &self,
        url: &str,
        method: &Method,
        correlation_id: &str,
        status: u16,
        duration: Duration,
    ) {
        info!(
            target: LOG_TARGET,
            "[{}] <-- {} {} {} ({}ms)",
            correlation_id,
            status,
            method,
            url,
            duration.as_millis()
        );
    }

    fn log_network_error(
        &self,
        url: &str,
        method: &Method,
        correlation_id: &str,
        error: &ClassifiedError,
        diagnostics: &RetryInfo,
    ) {
        warn!(
            target: LOG_TARGET,
            "[{}] xx {} {} failed with {} after {} attempt(s) in {}ms (breaker tripped: {}): {}",
            correlation_id,
            method,
            url,
            error.error_type,
            diagnostics.attempts,
            diagnostics.total_time.as_millis(),
            diagnostics.circuit_breaker_tripped,
            error.technical_message
        );
    }
}

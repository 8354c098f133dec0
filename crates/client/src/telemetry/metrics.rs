//! Per-call performance metric collaborator.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::warn;
use reqwest::Method;

use crate::errors::NetworkErrorType;

/// Retry details attached to each metric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricDetails {
    pub retry_attempts: usize,
    pub total_time: Duration,
    pub error: Option<NetworkErrorType>,
}

/// Receives one metric per logical call.
pub trait MetricsRecorder: Send + Sync {
    fn record_metric(
        &self,
        endpoint: &str,
        method: &Method,
        duration: Duration,
        status: Option<u16>,
        details: &MetricDetails,
    );
}

/// Discards every metric.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn record_metric(
        &self,
        _endpoint: &str,
        _method: &Method,
        _duration: Duration,
        _status: Option<u16>,
        _details: &MetricDetails,
    ) {
    }
}

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMetric {
    pub endpoint: String,
    pub method: Method,
    pub duration: Duration,
    pub status: Option<u16>,
    pub details: MetricDetails,
}

/// Keeps every metric in memory for later inspection.
#[derive(Debug, Default)]
pub struct InMemoryMetricsRecorder {
    records: Mutex<Vec<RequestMetric>>,
}

impl InMemoryMetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_records(&self) -> MutexGuard<'_, Vec<RequestMetric>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics recorder mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Copy of all recorded metrics, oldest first.
    pub fn snapshot(&self) -> Vec<RequestMetric> {
        self.lock_records().clone()
    }

    pub fn clear(&self) {
        self.lock_records().clear();
    }
}

impl MetricsRecorder for InMemoryMetricsRecorder {
    fn record_metric(
        &self,
        endpoint: &str,
        method: &Method,
        duration: Duration,
        status: Option<u16>,
        details: &MetricDetails,
    ) {
        self.lock_records().push(RequestMetric {
            endpoint: endpoint.to_string(),
            method: method.clone(),
            duration,
            status,
            details: details.clone(),
        });
    }
}

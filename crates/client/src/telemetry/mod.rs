//! Collaborator interfaces the client reports into: request logging,
//! per-call metrics, and the redaction applied before anything is logged.

mod logger;
mod metrics;
mod redact;

pub use logger::{LogRequestLogger, RequestLogger};
pub use metrics::{
    InMemoryMetricsRecorder, MetricDetails, MetricsRecorder, NoopMetricsRecorder, RequestMetric,
};
pub use redact::{is_sensitive_key, redact_headers, redact_json, REDACTED};

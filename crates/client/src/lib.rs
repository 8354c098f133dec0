//! Steadfast Client Crate
//!
//! A resilient HTTP request layer: every call is retried with capped
//! exponential backoff, guarded by a shared circuit breaker, and any failure is
//! normalized into a classified error with a user-facing message.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  ResilientClient |  (URL, headers, correlation id, logging, metrics)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |  RetryExecutor   | --> |  CircuitBreaker  |  (shared per client)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |    Transport     | --> |    classify()    |  (TransportError -> ClassifiedError)
//! +------------------+     +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`ResilientClient`] - The orchestrator callers talk to
//! - [`RequestOptions`] / [`ApiResponse`] - Per-call options and the result envelope
//! - [`RetryExecutor`] / [`RetryConfig`] - The retry loop and its policy
//! - [`CircuitBreaker`] - Three-state breaker shared across calls
//! - [`ClassifiedError`] / [`NetworkErrorType`] - The failure taxonomy
//! - [`Transport`] - Seam to the HTTP stack ([`ReqwestTransport`] in production)

pub mod client;
pub mod config;
pub mod correlation;
pub mod errors;
pub mod models;
pub mod resilience;
pub mod telemetry;

// Re-export the client surface
pub use client::{
    ApiResponse, RequestOptions, ReqwestTransport, ResilientClient, Transport, TransportRequest,
    TransportResponse, REQUEST_ID_HEADER,
};
pub use config::ClientConfig;

// Re-export correlation types
pub use correlation::{generate_request_id, IdGenerator, TimestampIdGenerator};

// Re-export error types
pub use errors::{
    classify, ClassifiedError, ConfigError, DecodeError, NetworkErrorType, RequestError,
    RequestFailure, TransportError, DEFAULT_RATE_LIMIT_DELAY,
};

// Re-export models
pub use models::{RequestContext, RetryInfo};

// Re-export resilience types
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, RetryAttempt,
    RetryConfig, RetryExecutor, RetryResult, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT,
};

// Re-export telemetry collaborators
pub use telemetry::{
    InMemoryMetricsRecorder, LogRequestLogger, MetricDetails, MetricsRecorder,
    NoopMetricsRecorder, RequestLogger, RequestMetric,
};

// HTTP vocabulary used throughout the public API
pub use reqwest::header::HeaderMap;
pub use reqwest::{Method, StatusCode};

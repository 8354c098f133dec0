//! Fault-tolerance primitives for the request layer.
//!
//! This module provides:
//! - Circuit breaking shared by all calls of one client
//! - Retry policy with capped exponential backoff and optional jitter
//! - The retry executor that ties both to the error classifier

mod circuit_breaker;
mod executor;
mod policy;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use executor::{RetryAttempt, RetryExecutor, RetryResult};
pub use policy::{RetryConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};

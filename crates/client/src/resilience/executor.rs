//! Drives one logical operation through its attempts.
//!
//! For each attempt the executor asks the circuit breaker for permission,
//! waits out the backoff delay, runs the operation under its timeout, and on
//! failure classifies the error and decides whether to try again. It always
//! resolves to a [`RetryResult`]; it never returns an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use super::{CircuitBreaker, RetryConfig};
use crate::errors::{classify, ClassifiedError, TransportError};
use crate::models::{RequestContext, RetryInfo};

/// Record of one failed attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryAttempt {
    /// Zero-based attempt index.
    pub attempt: u32,
    /// Delay applied before this attempt.
    pub delay: Duration,
    pub error: Option<ClassifiedError>,
}

/// Outcome of a whole retry sequence. Produced exactly once per call.
#[derive(Clone, Debug)]
pub struct RetryResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ClassifiedError>,
    /// Failed attempts, in order.
    pub attempts: Vec<RetryAttempt>,
    pub total_time: Duration,
    /// The breaker refused the first attempt; the operation never ran.
    pub circuit_breaker_tripped: bool,
}

impl<T> RetryResult<T> {
    fn succeeded(data: T, attempts: Vec<RetryAttempt>, total_time: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            attempts,
            total_time,
            circuit_breaker_tripped: false,
        }
    }

    fn failed(
        error: Option<ClassifiedError>,
        attempts: Vec<RetryAttempt>,
        total_time: Duration,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error,
            attempts,
            total_time,
            circuit_breaker_tripped: false,
        }
    }

    fn tripped(total_time: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: None,
            attempts: Vec::new(),
            total_time,
            circuit_breaker_tripped: true,
        }
    }

    /// Summary of this result for response envelopes and logs.
    pub fn retry_info(&self) -> RetryInfo {
        RetryInfo {
            attempts: self.attempts.len(),
            total_time: self.total_time,
            circuit_breaker_tripped: self.circuit_breaker_tripped,
        }
    }
}

/// Stateless retry driver bound to a client's circuit breaker.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
    breaker: Arc<CircuitBreaker>,
}

impl RetryExecutor {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// exhausts `config.max_attempts`, or the breaker refuses an attempt.
    ///
    /// A refusal before the first attempt yields a result with
    /// `circuit_breaker_tripped` set and no attempts. A refusal between
    /// retries stops the sequence with the last classified error.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        config: &RetryConfig,
        context: &RequestContext,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let started = Instant::now();
        let max_attempts = config.effective_max_attempts();
        let mut attempts: Vec<RetryAttempt> = Vec::new();
        let mut last_error: Option<ClassifiedError> = None;
        let mut last_delay = Duration::ZERO;

        for attempt in 0..max_attempts {
            if !self.breaker.allow_attempt() {
                if attempt == 0 {
                    warn!(
                        "[{}] Circuit breaker open, not dispatching {} {}",
                        context.correlation_id, context.method, context.url
                    );
                    return RetryResult::tripped(started.elapsed());
                }
                warn!(
                    "[{}] Circuit breaker opened mid-sequence, giving up after {} attempt(s)",
                    context.correlation_id,
                    attempts.len()
                );
                break;
            }

            let delay = if attempt == 0 {
                Duration::ZERO
            } else {
                next_delay(config, attempt, last_delay, last_error.as_ref())
            };

            if !delay.is_zero() {
                debug!(
                    "[{}] Waiting {:?} before attempt {}/{}",
                    context.correlation_id,
                    delay,
                    attempt + 1,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
            }
            last_delay = delay;

            match run_attempt(&mut operation, config.timeout).await {
                Ok(data) => {
                    self.breaker.record_success();
                    debug!(
                        "[{}] Attempt {}/{} succeeded",
                        context.correlation_id,
                        attempt + 1,
                        max_attempts
                    );
                    return RetryResult::succeeded(data, attempts, started.elapsed());
                }
                Err(error) => {
                    let classified = classify(
                        &error,
                        error.status_code(),
                        Some(&context.url),
                        Some(&context.correlation_id),
                    );
                    warn!(
                        "[{}] Attempt {}/{} failed: {}",
                        context.correlation_id,
                        attempt + 1,
                        max_attempts,
                        classified
                    );

                    attempts.push(RetryAttempt {
                        attempt,
                        delay,
                        error: Some(classified.clone()),
                    });
                    self.breaker.record_failure();

                    let retryable = classified.is_retryable;
                    last_error = Some(classified);
                    if !retryable {
                        debug!(
                            "[{}] Error is not retryable, stopping",
                            context.correlation_id
                        );
                        break;
                    }
                }
            }
        }

        RetryResult::failed(last_error, attempts, started.elapsed())
    }

    /// Run `operation` exactly once, bypassing the breaker and backoff.
    pub async fn execute_once<T, F, Fut>(
        &self,
        mut operation: F,
        config: &RetryConfig,
        context: &RequestContext,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let started = Instant::now();

        match run_attempt(&mut operation, config.timeout).await {
            Ok(data) => RetryResult::succeeded(data, Vec::new(), started.elapsed()),
            Err(error) => {
                let classified = classify(
                    &error,
                    error.status_code(),
                    Some(&context.url),
                    Some(&context.correlation_id),
                );
                warn!(
                    "[{}] Single attempt failed: {}",
                    context.correlation_id, classified
                );
                let attempts = vec![RetryAttempt {
                    attempt: 0,
                    delay: Duration::ZERO,
                    error: Some(classified.clone()),
                }];
                RetryResult::failed(Some(classified), attempts, started.elapsed())
            }
        }
    }
}

/// Delay before `attempt`: jittered backoff, raised to any server hint, capped
/// at `max_delay`, and never shorter than the previous delay.
fn next_delay(
    config: &RetryConfig,
    attempt: u32,
    previous: Duration,
    last_error: Option<&ClassifiedError>,
) -> Duration {
    let backoff = config.apply_jitter(config.delay_before(attempt));
    let hinted = match last_error.and_then(ClassifiedError::retry_after) {
        Some(hint) => backoff.max(hint),
        None => backoff,
    };
    hinted.min(config.max_delay).max(previous)
}

async fn run_attempt<T, F, Fut>(operation: &mut F, timeout: Duration) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    if timeout.is_zero() {
        return operation().await;
    }

    match tokio::time::timeout(timeout, operation()).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::TimedOut(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use reqwest::Method;

    use super::*;
    use crate::errors::NetworkErrorType;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};

    fn context() -> RequestContext {
        RequestContext::new("https://api.example.com/items", Method::GET, "req_test")
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(1),
            jitter: 0.0,
        }
    }

    fn executor() -> RetryExecutor {
        RetryExecutor::new(Arc::new(CircuitBreaker::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let result = executor()
            .execute_with_retry(|| async { Ok::<_, TransportError>(42) }, &fast_config(3), &context())
            .await;

        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.attempts.is_empty());
        assert!(!result.circuit_breaker_tripped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result = executor()
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(TransportError::status(500, "boom")) }
                },
                &fast_config(4),
                &context(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts.len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            result.error.map(|e| e.error_type),
            Some(NetworkErrorType::ServerError)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_after_one_attempt() {
        let result = executor()
            .execute_with_retry(
                || async { Err::<(), _>(TransportError::status(404, "missing")) },
                &fast_config(5),
                &context(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_connection_timeout() {
        let result = executor()
            .execute_with_retry(
                || async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, TransportError>(())
                },
                &fast_config(2),
                &context(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts.len(), 2);
        assert!(result.attempts.iter().all(|a| a
            .error
            .as_ref()
            .map(|e| e.error_type == NetworkErrorType::ConnectionTimeout)
            .unwrap_or(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_raises_delay() {
        let calls = AtomicU32::new(0);
        let result = executor()
            .execute_with_retry(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(TransportError::Status {
                                status: 429,
                                message: "slow down".to_string(),
                                retry_after: Some(Duration::from_secs(1)),
                            })
                        } else {
                            Ok("done")
                        }
                    }
                },
                &fast_config(3),
                &context(),
            )
            .await;

        assert!(result.success);
        assert!(result.total_time >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_respects_max_delay() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(500),
            ..fast_config(2)
        };
        let result = executor()
            .execute_with_retry(
                || async { Err::<(), _>(TransportError::status(429, "slow down")) },
                &config,
                &context(),
            )
            .await;

        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[1].delay, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_denial_before_first_attempt() {
        let breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        }));
        breaker.record_failure();

        let calls = AtomicU32::new(0);
        let result = RetryExecutor::new(breaker)
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, TransportError>(()) }
                },
                &fast_config(3),
                &context(),
            )
            .await;

        assert!(result.circuit_breaker_tripped);
        assert!(result.attempts.is_empty());
        assert!(result.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opening_mid_sequence_stops_retries() {
        let breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(60),
        }));

        let result = RetryExecutor::new(breaker)
            .execute_with_retry(
                || async { Err::<(), _>(TransportError::status(500, "boom")) },
                &fast_config(5),
                &context(),
            )
            .await;

        assert!(!result.success);
        assert!(!result.circuit_breaker_tripped);
        assert_eq!(result.attempts.len(), 2);
        assert!(result.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_does_not_wedge_breaker() {
        let breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(30),
        }));
        breaker.record_failure();
        let executor = RetryExecutor::new(Arc::clone(&breaker));
        tokio::time::advance(Duration::from_secs(31)).await;

        // The caller gives up on the probe before it reports
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            executor.execute_with_retry(
                || std::future::pending::<Result<(), TransportError>>(),
                &fast_config(1),
                &context(),
            ),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        tokio::time::advance(Duration::from_secs(3600)).await;

        let result = executor
            .execute_with_retry(
                || async { Ok::<_, TransportError>(7) },
                &fast_config(1),
                &context(),
            )
            .await;

        assert!(result.success);
        assert!(!result.circuit_breaker_tripped);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_once_ignores_breaker() {
        let breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        }));
        breaker.record_failure();
        let executor = RetryExecutor::new(Arc::clone(&breaker));

        let result = executor
            .execute_once(
                || async { Err::<(), _>(TransportError::status(500, "boom")) },
                &fast_config(5),
                &context(),
            )
            .await;

        assert!(!result.circuit_breaker_tripped);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[test]
    fn test_next_delay_never_decreases() {
        let config = RetryConfig {
            jitter: 0.9,
            max_delay: Duration::from_millis(300),
            ..fast_config(10)
        };

        let mut previous = Duration::ZERO;
        for attempt in 1..10 {
            let delay = next_delay(&config, attempt, previous, None);
            assert!(delay >= previous);
            assert!(delay <= config.max_delay);
            previous = delay;
        }
    }
}

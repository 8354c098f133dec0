//! Property-based integration tests for the retry executor, backoff policy,
//! circuit breaker, and error classifier.
//!
//! Executor properties run on a paused tokio clock so backoff sleeps cost
//! nothing in wall time.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use steadfast_client::{
    classify, CircuitBreaker, CircuitBreakerConfig, CircuitState, Method, NetworkErrorType,
    RequestContext, RetryConfig, RetryExecutor, TransportError,
};

// =============================================================================
// Helpers
// =============================================================================

fn context() -> RequestContext {
    RequestContext::new("https://api.example.com/items", Method::GET, "req_prop")
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn block_on<F: Future>(future: F) -> F::Output {
    paused_runtime().block_on(future)
}

fn executor_with_threshold(failure_threshold: u32) -> RetryExecutor {
    RetryExecutor::new(Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
        failure_threshold,
        cooldown: Duration::from_secs(60),
    })))
}

// =============================================================================
// Generators
// =============================================================================

/// Generates a retry policy with bounded, non-degenerate delays.
fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
    (
        1u32..8,         // max_attempts
        1u64..2_000,     // base_delay ms
        1u64..20_000,    // max_delay ms
        1.0f64..4.0,     // multiplier
        0.0f64..0.9,     // jitter
    )
        .prop_map(|(max_attempts, base_ms, max_ms, multiplier, jitter)| RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: multiplier,
            timeout: Duration::from_secs(5),
            jitter,
        })
}

/// Generates a raw transport failure of any shape.
fn arb_transport_error() -> impl Strategy<Value = TransportError> {
    prop_oneof![
        (1u64..60_000).prop_map(|ms| TransportError::TimedOut(Duration::from_millis(ms))),
        (100u16..600, "[a-z ]{0,20}").prop_map(|(s, m)| TransportError::status(s, m)),
        "[a-z ]{0,20}".prop_map(TransportError::TransportTimeout),
        "[a-z ]{0,20}".prop_map(TransportError::Dns),
        "[a-z ]{0,20}".prop_map(TransportError::Connect),
        "[a-z ]{0,20}".prop_map(TransportError::Cors),
        Just(TransportError::CircuitOpen),
        "[a-z ]{0,30}".prop_map(TransportError::Other),
    ]
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The un-jittered schedule starts at zero, never shrinks, and never
    /// exceeds the cap.
    #[test]
    fn prop_backoff_schedule_is_monotonic_and_capped(config in arb_retry_config()) {
        prop_assert_eq!(config.delay_before(0), Duration::ZERO);

        let mut previous = Duration::ZERO;
        for attempt in 1..12 {
            let delay = config.delay_before(attempt);
            prop_assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            prop_assert!(delay <= config.max_delay);
            previous = delay;
        }
    }

    /// Jitter only ever shortens a delay, and by at most the jitter fraction.
    #[test]
    fn prop_jitter_stays_within_bounds(config in arb_retry_config(), ms in 1u64..60_000) {
        let delay = Duration::from_millis(ms);
        let jittered = config.apply_jitter(delay);

        prop_assert!(jittered <= delay);
        let floor = delay.mul_f64(1.0 - config.jitter);
        prop_assert!(jittered + Duration::from_micros(1) >= floor);
    }

    /// Retryability is a pure function of the error type.
    #[test]
    fn prop_retryability_follows_type(error in arb_transport_error()) {
        let classified = classify(&error, None, None, Some("req_prop"));

        prop_assert_eq!(classified.is_retryable, classified.error_type.is_retryable());
        prop_assert_eq!(classified.request_id.as_str(), "req_prop");
        prop_assert!(!classified.user_message.is_empty());
        prop_assert!(!classified.suggested_action.is_empty());
    }

    /// Client errors (other than 429) are never retried; every 5xx is.
    #[test]
    fn prop_status_families(status in 400u16..600) {
        let classified = classify(&TransportError::status(status, "x"), None, None, None);

        if status == 429 {
            prop_assert_eq!(classified.error_type, NetworkErrorType::RateLimited);
            prop_assert!(classified.is_retryable);
        } else if status < 500 {
            prop_assert_eq!(classified.error_type, NetworkErrorType::ClientError);
            prop_assert!(!classified.is_retryable);
        } else {
            prop_assert!(classified.is_retryable);
        }
    }

    /// An always-failing retryable operation runs exactly `max_attempts`
    /// times, with non-decreasing delays bounded by `max_delay`.
    #[test]
    fn prop_always_failing_uses_every_attempt(config in arb_retry_config()) {
        let executor = executor_with_threshold(u32::MAX);
        let calls = AtomicU32::new(0);

        let result = block_on(executor.execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TransportError::status(500, "boom")) }
            },
            &config,
            &context(),
        ));

        prop_assert!(!result.success);
        prop_assert!(!result.circuit_breaker_tripped);
        prop_assert_eq!(calls.load(Ordering::SeqCst), config.max_attempts);
        prop_assert_eq!(result.attempts.len(), config.max_attempts as usize);
        prop_assert_eq!(
            result.error.as_ref().map(|e| e.error_type),
            Some(NetworkErrorType::ServerError)
        );

        let mut previous = Duration::ZERO;
        for (index, attempt) in result.attempts.iter().enumerate() {
            prop_assert_eq!(attempt.attempt as usize, index);
            prop_assert!(attempt.delay >= previous);
            prop_assert!(attempt.delay <= config.max_delay);
            previous = attempt.delay;
        }
        prop_assert_eq!(result.attempts[0].delay, Duration::ZERO);
    }

    /// A non-retryable failure stops after a single attempt regardless of policy.
    #[test]
    fn prop_non_retryable_stops_immediately(config in arb_retry_config(), status in 400u16..429) {
        let executor = executor_with_threshold(u32::MAX);
        let calls = AtomicU32::new(0);

        let result = block_on(executor.execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(TransportError::status(status, "nope")) }
            },
            &config,
            &context(),
        ));

        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        prop_assert_eq!(result.attempts.len(), 1);
        prop_assert_eq!(
            result.error.as_ref().map(|e| e.error_type),
            Some(NetworkErrorType::ClientError)
        );
    }

    /// The circuit opens exactly when consecutive failures reach the threshold.
    #[test]
    fn prop_breaker_opens_at_threshold(threshold in 1u32..20, failures in 0u32..40) {
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(60),
        });
        for _ in 0..failures {
            breaker.record_failure();
        }

        if failures >= threshold {
            prop_assert_eq!(breaker.state(), CircuitState::Open);
            prop_assert!(!breaker.allow_attempt());
        } else {
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
            prop_assert!(breaker.allow_attempt());
        }
        prop_assert_eq!(breaker.failure_count(), failures);
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_recovers_after_server_and_network_errors() {
    let executor = executor_with_threshold(5);
    let config = RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        backoff_multiplier: 2.0,
        timeout: Duration::from_secs(1),
        jitter: 0.0,
    };
    let calls = AtomicU32::new(0);

    let result = executor
        .execute_with_retry(
            || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match call {
                        0 => Err(TransportError::status(500, "internal error")),
                        1 => Err(TransportError::Connect("connection refused".to_string())),
                        _ => Ok("payload"),
                    }
                }
            },
            &config,
            &context(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.data, Some("payload"));
    assert!(!result.circuit_breaker_tripped);

    let summary: Vec<(u32, Duration, Option<NetworkErrorType>)> = result
        .attempts
        .iter()
        .map(|a| (a.attempt, a.delay, a.error.as_ref().map(|e| e.error_type)))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, Duration::ZERO, Some(NetworkErrorType::ServerError)),
            (
                1,
                Duration::from_millis(100),
                Some(NetworkErrorType::NetworkUnreachable)
            ),
        ]
    );
    assert!(result.total_time >= Duration::from_millis(300));
    assert_eq!(executor.circuit_breaker().failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sixth_call_is_short_circuited() {
    let executor = executor_with_threshold(5);
    let config = RetryConfig {
        max_attempts: 1,
        ..Default::default()
    };
    let calls = AtomicU32::new(0);
    let operation = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(TransportError::status(502, "bad gateway")) }
    };

    for _ in 0..5 {
        let result = executor
            .execute_with_retry(operation, &config, &context())
            .await;
        assert!(!result.circuit_breaker_tripped);
    }
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);

    let result = executor
        .execute_with_retry(operation, &config, &context())
        .await;

    assert!(result.circuit_breaker_tripped);
    assert!(result.attempts.is_empty());
    assert!(result.error.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_probe_closes_circuit() {
    let executor = executor_with_threshold(1);
    let config = RetryConfig {
        max_attempts: 1,
        ..Default::default()
    };

    let result = executor
        .execute_with_retry(
            || async { Err::<(), _>(TransportError::status(500, "boom")) },
            &config,
            &context(),
        )
        .await;
    assert!(!result.success);
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(61)).await;

    let result = executor
        .execute_with_retry(|| async { Ok::<_, TransportError>(42) }, &config, &context())
        .await;
    assert!(result.success);
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_execute_once_bypasses_open_breaker() {
    let executor = executor_with_threshold(1);
    executor.circuit_breaker().record_failure();
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);

    let result = executor
        .execute_once(
            || async { Ok::<_, TransportError>("direct") },
            &RetryConfig::default(),
            &context(),
        )
        .await;

    assert!(result.success);
    assert!(result.attempts.is_empty());
    assert_eq!(executor.circuit_breaker().state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_hint_stretches_delay() {
    let executor = executor_with_threshold(10);
    let config = RetryConfig {
        max_attempts: 2,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
        timeout: Duration::from_secs(1),
        jitter: 0.0,
    };
    let calls = AtomicU32::new(0);

    let result = executor
        .execute_with_retry(
            || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(TransportError::Status {
                            status: 429,
                            message: "slow down".to_string(),
                            retry_after: Some(Duration::from_secs(2)),
                        })
                    } else {
                        Ok(())
                    }
                }
            },
            &config,
            &context(),
        )
        .await;

    assert!(result.success);
    assert!(result.total_time >= Duration::from_secs(2));
}

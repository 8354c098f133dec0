//! Retry policy and backoff schedule.

use std::time::Duration;

use rand::Rng;

/// Default number of attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Retry policy for one call, or a client-wide default.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Upper bound on attempts. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to every delay.
    pub max_delay: Duration,
    /// Growth factor between retries. Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,
    /// Per-attempt timeout. Zero disables the timeout.
    pub timeout: Duration,
    /// Fraction in `[0, 1)` by which a delay may be randomly shortened.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            timeout: DEFAULT_TIMEOUT,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Attempts actually allowed, never less than one.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Un-jittered delay applied before attempt `attempt` (zero-based).
    ///
    /// Attempt 0 runs immediately; attempt `i > 0` waits
    /// `min(max_delay, base_delay * multiplier^(i-1))`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.max(1.0);
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let micros = self.base_delay.as_micros() as f64 * multiplier.powi(exponent);
        let cap = self.max_delay.as_micros() as f64;

        if !micros.is_finite() || micros >= cap {
            self.max_delay
        } else {
            Duration::from_micros(micros.round() as u64)
        }
    }

    /// Randomly shorten `delay` by at most the configured jitter fraction.
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        let jitter = self.jitter.clamp(0.0, 0.99);
        if jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let factor = 1.0 - rand::thread_rng().gen_range(0.0..jitter);
        delay.mul_f64(factor)
    }
}

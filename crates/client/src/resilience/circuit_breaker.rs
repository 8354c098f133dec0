//! Client-wide circuit breaker.
//!
//! Implements the circuit breaker pattern to stop dispatching requests to a
//! failing dependency. The circuit has three states:
//!
//! - **Closed**: Normal operation, attempts are allowed.
//! - **Open**: Failure threshold reached, attempts are refused.
//! - **HalfOpen**: Cool-down elapsed, a single probe attempt is allowed.
//!
//! One breaker is owned by each client instance and shared by every call made
//! through it. State is in-memory only.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::Instant;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - attempts are allowed.
    Closed,
    /// Dependency is failing - attempts are refused.
    Open,
    /// Testing recovery - one probe attempt allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    /// When the circuit last opened (cool-down start).
    opened_at: Option<Instant>,
    /// When the outstanding HalfOpen probe was handed out. A probe that has not
    /// reported within one cool-down is considered lost.
    probe_started_at: Option<Instant>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_started_at: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.probe_started_at = None;
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit. Zero is treated as one.
    pub failure_threshold: u32,
    /// Time the circuit stays open before allowing a probe.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Point-in-time view of the breaker for operational reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    /// Milliseconds since the circuit last opened.
    pub open_for_ms: Option<u64>,
}

/// Thread-safe circuit breaker shared by all calls of one client.
///
/// Never raises errors itself; it only grants or refuses permission to attempt.
#[derive(Debug)]
pub struct CircuitBreaker {
    circuit: Mutex<Circuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuit: Mutex::new(Circuit::new()),
            config,
        }
    }

    /// Lock the circuit, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is slightly stale circuit state,
    /// which is preferable to panicking in the request path.
    fn lock_circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn threshold(&self) -> u32 {
        self.config.failure_threshold.max(1)
    }

    /// Check whether an attempt may be dispatched.
    ///
    /// Handles the Open -> HalfOpen transition once the cool-down has elapsed and
    /// hands out at most one probe while HalfOpen. A probe whose caller dropped it
    /// without recording a result is replaced once a full cool-down has passed.
    pub fn allow_attempt(&self) -> bool {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => match circuit.probe_started_at {
                Some(started) if started.elapsed() < self.config.cooldown => false,
                previous => {
                    if previous.is_some() {
                        warn!("Circuit breaker: probe never reported, handing out a new one");
                    }
                    circuit.probe_started_at = Some(Instant::now());
                    true
                }
            },
            CircuitState::Open => {
                let cooled_down = circuit
                    .opened_at
                    .map(|opened| opened.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);

                if cooled_down {
                    info!("Circuit breaker: transitioning from OPEN to HALF_OPEN");
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_started_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful attempt. Resets the consecutive failure count.
    pub fn record_success(&self) {
        let mut circuit = self.lock_circuit();
        circuit.consecutive_failures = 0;

        match circuit.state {
            CircuitState::Closed => {
                debug!("Circuit breaker: success, failure count reset");
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker: probe succeeded, closing circuit");
                circuit.state = CircuitState::Closed;
                circuit.opened_at = None;
                circuit.probe_started_at = None;
            }
            CircuitState::Open => {
                // A call dispatched before the circuit opened finished late.
                debug!("Circuit breaker: late success while OPEN");
            }
        }
    }

    /// Record a failed attempt.
    ///
    /// Opens the circuit once the threshold is reached. In HalfOpen any failure
    /// reopens the circuit and restarts the cool-down.
    pub fn record_failure(&self) {
        let threshold = self.threshold();
        let mut circuit = self.lock_circuit();
        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= threshold {
                    info!(
                        "Circuit breaker: opening circuit after {} consecutive failures",
                        circuit.consecutive_failures
                    );
                    circuit.open();
                } else {
                    debug!(
                        "Circuit breaker: failure ({}/{})",
                        circuit.consecutive_failures, threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker: probe failed, reopening circuit");
                circuit.open();
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure while OPEN ({} total)",
                    circuit.consecutive_failures
                );
            }
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.lock_circuit().state
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock_circuit().consecutive_failures
    }

    /// Reset the circuit to Closed with a zero failure count.
    pub fn reset(&self) {
        let mut circuit = self.lock_circuit();
        info!("Circuit breaker: manually resetting circuit");
        *circuit = Circuit::new();
    }

    /// Point-in-time view of the circuit for operational reporting.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let circuit = self.lock_circuit();
        CircuitSnapshot {
            state: circuit.state,
            consecutive_failures: circuit.consecutive_failures,
            failure_threshold: self.threshold(),
            open_for_ms: circuit
                .opened_at
                .map(|opened| opened.elapsed().as_millis() as u64),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

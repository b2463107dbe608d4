//! Circuit Breaker
//!
//! Per-target breaker guarding calls to the advertising API.
//!
//! `Closed --failures >= threshold--> Open --reset timeout--> HalfOpen`;
//! a half-open trial closes the breaker on success and reopens it on failure.
//! Exactly one trial is admitted while half-open.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::clock::checked_after;
use crate::core::{Clock, SystemClock};
use crate::error::{AccessError, ErrorKind};
use crate::telemetry::{AccessMetrics, NoOpMetrics};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, one trial request allowed.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to keep the circuit open before a trial call.
    pub reset_timeout: Duration,
    /// Count non-retryable failures too (credential failures never count).
    pub count_non_retryable: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            count_non_retryable: false,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n.max(1);
        self
    }

    /// Set reset timeout
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Count non-retryable failures
    pub fn count_non_retryable(mut self, count: bool) -> Self {
        self.count_non_retryable = count;
        self
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Internal circuit breaker state
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Circuit breaker for one target.
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn AccessMetrics>,
    state: Mutex<CircuitBreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker on the system clock.
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_components(target, config, Arc::new(SystemClock), Arc::new(NoOpMetrics))
    }

    /// Create a breaker with custom clock and metrics.
    pub fn with_components(
        target: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn AccessMetrics>,
    ) -> Self {
        Self {
            target: target.into(),
            config,
            clock,
            metrics,
            state: Mutex::new(CircuitBreakerState::default()),
        }
    }

    /// Target this breaker guards.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.maybe_transition_to_half_open(&mut state);
        state.state
    }

    /// Get a snapshot of state, counter and opened_at.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut state = self.state.lock();
        self.maybe_transition_to_half_open(&mut state);
        BreakerSnapshot {
            state: state.state,
            failure_count: state.failure_count,
            opened_at: state.opened_at,
        }
    }

    /// Ask permission for one call.
    ///
    /// Returns `None` while open, or while half-open with the trial taken.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BreakerPermit> {
        let mut state = self.state.lock();
        self.maybe_transition_to_half_open(&mut state);

        let trial = match state.state {
            CircuitState::Closed => false,
            CircuitState::Open => return None,
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    return None;
                }
                state.trial_in_flight = true;
                true
            }
        };

        Some(BreakerPermit {
            breaker: Arc::clone(self),
            trial,
            settled: false,
        })
    }

    /// Check if a failure should move the counter.
    pub fn counts_failure(&self, error: &AccessError, retryable: bool) -> bool {
        if matches!(
            error.kind(),
            ErrorKind::InvalidGrant | ErrorKind::Unauthorized | ErrorKind::Cancelled
        ) {
            return false;
        }
        retryable || self.config.count_non_retryable
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let previous = state.state;
        *state = CircuitBreakerState::default();
        if previous != CircuitState::Closed {
            self.metrics
                .record_circuit_state(&self.target, CircuitState::Closed.as_str());
        }
        debug!(target_name = %self.target, "Circuit breaker reset to CLOSED");
    }

    fn record_success(&self, trial: bool) {
        let mut state = self.state.lock();

        if trial {
            state.trial_in_flight = false;
        }

        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(target_name = %self.target, "Circuit breaker transitioning to CLOSED");
                state.state = CircuitState::Closed;
                state.failure_count = 0;
                state.opened_at = None;
                self.metrics
                    .record_circuit_state(&self.target, CircuitState::Closed.as_str());
            }
            CircuitState::Open => {
                // A call admitted before another caller opened the circuit.
                debug!(target_name = %self.target, "Success recorded while circuit is open");
            }
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut state = self.state.lock();
        let now = self.clock.now();

        if trial {
            state.trial_in_flight = false;
        }

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;

                if state.failure_count >= self.config.failure_threshold {
                    warn!(
                        target_name = %self.target,
                        failure_count = state.failure_count,
                        "Circuit breaker transitioning to OPEN"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                    self.metrics
                        .record_circuit_state(&self.target, CircuitState::Open.as_str());
                }
            }
            CircuitState::HalfOpen => {
                warn!(target_name = %self.target, "Circuit breaker returning to OPEN from half-open");
                state.state = CircuitState::Open;
                state.failure_count += 1;
                state.opened_at = Some(now);
                self.metrics
                    .record_circuit_state(&self.target, CircuitState::Open.as_str());
            }
            CircuitState::Open => {}
        }
    }

    fn release(&self, trial: bool) {
        if trial {
            self.state.lock().trial_in_flight = false;
        }
    }

    fn maybe_transition_to_half_open(&self, state: &mut CircuitBreakerState) {
        if state.state != CircuitState::Open {
            return;
        }

        if let Some(opened_at) = state.opened_at {
            // An unrepresentable deadline never elapses.
            let elapsed = checked_after(opened_at, self.config.reset_timeout)
                .is_some_and(|deadline| self.clock.now() >= deadline);
            if elapsed {
                debug!(target_name = %self.target, "Circuit breaker transitioning to HALF_OPEN");
                state.state = CircuitState::HalfOpen;
                state.trial_in_flight = false;
                self.metrics
                    .record_circuit_state(&self.target, CircuitState::HalfOpen.as_str());
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("target", &self.target)
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Permission for one call through a breaker.
///
/// Dropping an unsettled permit (e.g. a cancelled call) records nothing and
/// frees the half-open trial slot.
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    settled: bool,
}

impl BreakerPermit {
    /// Whether this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Settle as success.
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    /// Settle as a counted failure.
    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }

    /// Settle without a verdict.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.release(self.trial);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.trial);
        }
    }
}

/// Breakers keyed by target, created on first use.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn AccessMetrics>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry on the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_components(config, Arc::new(SystemClock), Arc::new(NoOpMetrics))
    }

    /// Create a registry with custom clock and metrics.
    pub fn with_components(
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn AccessMetrics>,
    ) -> Self {
        Self {
            config,
            clock,
            metrics,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for `target`.
    pub fn get(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(target) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(target.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::with_components(
                target,
                self.config.clone(),
                Arc::clone(&self.clock),
                Arc::clone(&self.metrics),
            ))
        });
        Arc::clone(breaker)
    }

    /// State of `target`; unknown targets are closed.
    pub fn state(&self, target: &str) -> CircuitState {
        self.breakers
            .read()
            .get(target)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of `target`, if it has been used.
    pub fn snapshot(&self, target: &str) -> Option<BreakerSnapshot> {
        self.breakers.read().get(target).map(|breaker| breaker.snapshot())
    }

    /// Reset one target.
    pub fn reset(&self, target: &str) {
        if let Some(breaker) = self.breakers.read().get(target) {
            breaker.reset();
        }
    }

    /// Targets seen so far.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.breakers.read().keys().cloned().collect();
        targets.sort();
        targets
    }
}

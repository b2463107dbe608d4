//! Retry Policy
//!
//! Exponential backoff policy and per-call attempt state.

use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{AccessError, ErrorKind};

/// Retry configuration for one logical operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0-1.0), applied symmetrically.
    pub jitter: f64,
    /// Error kinds worth another attempt.
    pub retryable: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.0,
            retryable: ErrorKind::DEFAULT_RETRYABLE.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a policy from host knobs given in seconds.
    pub fn from_seconds(max_attempts: u32, initial_delay_secs: f64, max_delay_secs: f64) -> Self {
        Self::default()
            .max_attempts(max_attempts)
            .initial_delay(Duration::try_from_secs_f64(initial_delay_secs).unwrap_or_default())
            .max_delay(Duration::try_from_secs_f64(max_delay_secs).unwrap_or_default())
    }

    /// Policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self::default().max_attempts(1)
    }

    /// Set maximum attempts
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.backoff_multiplier = m;
        self
    }

    /// Set jitter factor
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Replace the retryable kinds
    pub fn retry_on<I: IntoIterator<Item = ErrorKind>>(mut self, kinds: I) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Check if an error is retryable under this policy.
    pub fn is_retryable(&self, error: &AccessError) -> bool {
        self.retryable.contains(&error.kind())
    }

    /// Delay after the given failed attempt (1-based), without jitter.
    ///
    /// `min(initial_delay * multiplier^(attempt-1), max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Delay to sleep before retrying after `error`.
    ///
    /// Honors a provider retry-after hint when it is longer than the computed
    /// backoff; the result never exceeds `max_delay`.
    pub fn backoff_delay(&self, attempt: u32, error: &AccessError) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        let hinted = error
            .retry_after()
            .map_or(computed, |hint| hint.max(computed))
            .min(self.max_delay);

        if self.jitter <= 0.0 {
            return hinted;
        }

        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::try_from_secs_f64(hinted.as_secs_f64() * factor)
            .unwrap_or(hinted)
            .min(self.max_delay)
    }
}

/// Attempt state for one `execute` call.
#[derive(Debug, Default)]
pub struct RetryAttempt {
    /// Attempts started so far.
    pub attempt: u32,
    /// Total time spent sleeping between attempts.
    pub cumulative_delay: Duration,
    /// Error of the latest failed attempt.
    pub last_error: Option<AccessError>,
}

impl RetryAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of another attempt.
    pub fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Check if the policy allows another attempt.
    pub fn has_remaining(&self, policy: &RetryPolicy) -> bool {
        self.attempt < policy.max_attempts
    }

    /// Record a failed attempt followed by `delay`.
    pub fn record_failure(&mut self, error: AccessError, delay: Duration) {
        self.last_error = Some(error);
        self.cumulative_delay += delay;
    }
}

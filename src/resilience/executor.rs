//! Resilient Call Executor
//!
//! Runs outbound calls under a per-target circuit breaker and a retry policy.

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use super::retry::{RetryAttempt, RetryPolicy};
use crate::error::{AccessError, AccessResult, ErrorKind, ResilienceError, TokenError};
use crate::telemetry::{AccessMetrics, NoOpMetrics};
use crate::token::TokenManager;
use crate::types::{AccessCredential, CredentialStatus};

/// Executor wrapping calls with retry and circuit breaking.
pub struct ResilientExecutor {
    registry: Arc<CircuitBreakerRegistry>,
    default_policy: RetryPolicy,
    metrics: Arc<dyn AccessMetrics>,
}

impl ResilientExecutor {
    /// Create an executor over an existing breaker registry.
    pub fn new(registry: Arc<CircuitBreakerRegistry>, default_policy: RetryPolicy) -> Self {
        Self {
            registry,
            default_policy,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Create an executor with its own registry on the system clock.
    pub fn with_config(breaker: CircuitBreakerConfig, default_policy: RetryPolicy) -> Self {
        Self::new(Arc::new(CircuitBreakerRegistry::new(breaker)), default_policy)
    }

    /// Set metrics.
    pub fn with_metrics(mut self, metrics: Arc<dyn AccessMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Breakers used by this executor.
    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Policy used by [`ResilientExecutor::execute_default`].
    pub fn default_policy(&self) -> &RetryPolicy {
        &self.default_policy
    }

    /// Run `operation` against `target` under `policy`.
    ///
    /// Terminal errors: the operation's own error when it is not retryable,
    /// `RetriesExhausted` when attempts ran out, `CircuitOpen` when the
    /// breaker refused an attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        target: &str,
        operation: F,
        policy: &RetryPolicy,
    ) -> AccessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        self.run(target, operation, policy, None).await
    }

    /// Like [`ResilientExecutor::execute`], but stops with `Cancelled` once
    /// `cancel` fires before an attempt or during a backoff sleep.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        target: &str,
        operation: F,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> AccessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        self.run(target, operation, policy, Some(cancel)).await
    }

    /// Run `operation` under the default policy.
    pub async fn execute_default<T, F, Fut>(&self, target: &str, operation: F) -> AccessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        self.run(target, operation, &self.default_policy, None).await
    }

    /// Run an authenticated call for `principal`.
    ///
    /// If the provider rejects the access credential (`Unauthorized`), the
    /// principal is refreshed once and the call is retried with the new
    /// credential.
    pub async fn execute_with_refresh<T, F, Fut>(
        &self,
        manager: &dyn TokenManager,
        principal: &str,
        target: &str,
        mut operation: F,
        policy: &RetryPolicy,
    ) -> AccessResult<T>
    where
        F: FnMut(AccessCredential) -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        let status = manager.get_usable_credential(principal).await?;
        let credential = require_usable(status, principal)?;

        let first = self
            .run(target, || operation(credential.clone()), policy, None)
            .await;

        match first {
            Err(error) if error.kind() == ErrorKind::Unauthorized => {
                info!(
                    principal = %principal,
                    target_name = %target,
                    "Access credential rejected, refreshing once"
                );
                let status = manager.refresh_rejected(principal, &credential).await?;
                let refreshed = require_usable(status, principal)?;
                self.run(target, || operation(refreshed.clone()), policy, None)
                    .await
            }
            other => other,
        }
    }

    async fn run<T, F, Fut>(
        &self,
        target: &str,
        mut operation: F,
        policy: &RetryPolicy,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        let breaker = self.registry.get(target);
        let mut attempt = RetryAttempt::new();

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(target_name = %target, attempt = attempt.attempt, "Call cancelled");
                return Err(ResilienceError::Cancelled.into());
            }

            let current = attempt.begin();

            let Some(permit) = breaker.try_acquire() else {
                debug!(target_name = %target, attempt = current, "Circuit open, call rejected");
                self.metrics.record_circuit_rejection(target);
                return Err(ResilienceError::CircuitOpen {
                    target: target.to_string(),
                }
                .into());
            };

            self.metrics.record_attempt(target);

            let error = match operation().await {
                Ok(value) => {
                    permit.record_success();
                    if current > 1 {
                        debug!(target_name = %target, attempt = current, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let retryable = policy.is_retryable(&error);
            if breaker.counts_failure(&error, retryable) {
                permit.record_failure();
            } else {
                permit.release();
            }

            if !retryable {
                self.metrics.record_error(error.kind().as_str(), target);
                return Err(error);
            }

            if !attempt.has_remaining(policy) {
                warn!(
                    target_name = %target,
                    attempts = current,
                    error = %error,
                    "Retries exhausted"
                );
                self.metrics
                    .record_error(ErrorKind::RetriesExhausted.as_str(), target);
                return Err(ResilienceError::RetriesExhausted {
                    attempts: current,
                    last: Box::new(error),
                }
                .into());
            }

            let delay = policy.backoff_delay(current, &error);
            warn!(
                target_name = %target,
                attempt = current,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after transient failure"
            );
            self.metrics.record_retry(target, delay);
            attempt.record_failure(error, delay);

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(target_name = %target, attempt = current, "Call cancelled during backoff");
                            return Err(ResilienceError::Cancelled.into());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("default_policy", &self.default_policy)
            .field("targets", &self.registry.targets())
            .finish()
    }
}

fn require_usable(status: CredentialStatus, principal: &str) -> AccessResult<AccessCredential> {
    match status {
        CredentialStatus::Usable(credential) => Ok(credential),
        CredentialStatus::NeedsInteractiveAuth => Err(AccessError::Token(
            TokenError::InteractiveAuthRequired {
                principal: principal.to_string(),
            },
        )),
    }
}

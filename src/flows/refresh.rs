//! Token Refresh
//!
//! RFC 6749 Section 6 - Refreshing an Access Token.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::token_endpoint::{client_authenticated_post, parse_token_response};
use crate::core::{Clock, HttpTransport, SystemClock};
use crate::error::{AccessError, AccessResult, NetworkError};
use crate::telemetry::{AccessMetrics, NoOpMetrics};
use crate::types::{AccessConfig, GrantType, TokenRecord};

/// Token refresher interface.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange a refresh credential for a new token record.
    ///
    /// When the provider does not rotate the refresh credential, the returned
    /// record keeps `refresh_credential`.
    async fn refresh(&self, refresh_credential: &str) -> AccessResult<TokenRecord>;
}

/// Refresher calling the provider token endpoint.
pub struct DefaultTokenRefresher<T: HttpTransport> {
    config: Arc<AccessConfig>,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn AccessMetrics>,
}

impl<T: HttpTransport> DefaultTokenRefresher<T> {
    /// Create new refresher.
    pub fn new(config: Arc<AccessConfig>, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set metrics.
    pub fn with_metrics(mut self, metrics: Arc<dyn AccessMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl<T: HttpTransport> TokenRefresher for DefaultTokenRefresher<T> {
    async fn refresh(&self, refresh_credential: &str) -> AccessResult<TokenRecord> {
        let request = client_authenticated_post(
            &self.config,
            &self.config.provider.token_endpoint,
            &[
                ("grant_type", GrantType::RefreshToken.as_str()),
                ("refresh_token", refresh_credential),
            ],
        );

        let issued_at = self.clock.now();
        let response = match self.transport.send(request).await {
            Ok(response) => parse_token_response(response),
            Err(error) => Err(error),
        };

        match response {
            Ok(response) => {
                self.metrics.record_token_refresh(true);
                let record = TokenRecord::from_response(response, issued_at, &self.config.scopes)
                    .or_refresh_credential(refresh_credential);
                debug!(expires_at = %record.expires_at, "Token refreshed");
                Ok(record)
            }
            Err(error) => {
                self.metrics.record_token_refresh(false);
                warn!(error = %error, kind = %error.kind(), "Token refresh failed");
                Err(error)
            }
        }
    }
}

/// Mock refresher for testing.
///
/// Results are returned in the order they were queued; once the queue is
/// empty a fresh one-hour record is issued.
#[derive(Default)]
pub struct MockTokenRefresher {
    results: Mutex<VecDeque<AccessResult<TokenRecord>>>,
    refresh_history: Mutex<Vec<String>>,
    latency: Mutex<Option<Duration>>,
    refresh_count: AtomicU32,
}

impl MockTokenRefresher {
    /// Create new mock refresher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record to return.
    pub fn queue_record(&self, record: TokenRecord) -> &Self {
        self.results.lock().push_back(Ok(record));
        self
    }

    /// Queue an error to return.
    pub fn queue_error(&self, error: AccessError) -> &Self {
        self.results.lock().push_back(Err(error));
        self
    }

    /// Queue a transient network failure.
    pub fn queue_transient_failure(&self) -> &Self {
        self.queue_error(AccessError::Network(NetworkError::ConnectionFailed {
            message: "mock connection reset".to_string(),
        }))
    }

    /// Delay every refresh, so concurrent callers overlap.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Number of refreshes performed.
    pub fn refresh_count(&self) -> u32 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Refresh credentials presented so far.
    pub fn get_refresh_history(&self) -> Vec<String> {
        self.refresh_history.lock().clone()
    }
}

#[async_trait]
impl TokenRefresher for MockTokenRefresher {
    async fn refresh(&self, refresh_credential: &str) -> AccessResult<TokenRecord> {
        let count = self.refresh_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_history.lock().push(refresh_credential.to_string());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let queued = self.results.lock().pop_front();
        match queued {
            Some(result) => result.map(|record| record.or_refresh_credential(refresh_credential)),
            None => Ok(TokenRecord::new(
                format!("mock-access-token-{}", count),
                chrono::Utc::now(),
                Duration::from_secs(3600),
            )
            .with_refresh_credential(refresh_credential)),
        }
    }
}

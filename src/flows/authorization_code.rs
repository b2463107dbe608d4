//! Authorization Code Exchange
//!
//! RFC 6749 Section 4.1 - Authorization Code Grant.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use super::token_endpoint::{client_authenticated_post, parse_token_response};
use crate::core::{Clock, HttpTransport, SystemClock};
use crate::error::{AccessError, AccessResult, ConfigurationError};
use crate::telemetry::{AccessMetrics, NoOpMetrics};
use crate::types::{AccessConfig, GrantType, TokenRecord};

/// Authorization-code exchanger interface.
#[async_trait]
pub trait AuthorizationCodeExchanger: Send + Sync {
    /// Build the provider URL the user is redirected to.
    ///
    /// `scopes` overrides the configured scopes when given.
    fn authorization_url(&self, state: &str, scopes: Option<&[String]>) -> AccessResult<String>;

    /// Exchange a one-time authorization code for an initial token record.
    async fn exchange(&self, code: &str, redirect_uri: &str) -> AccessResult<TokenRecord>;
}

/// Exchanger calling the provider token endpoint.
pub struct DefaultAuthorizationCodeExchanger<T: HttpTransport> {
    config: Arc<AccessConfig>,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn AccessMetrics>,
}

impl<T: HttpTransport> DefaultAuthorizationCodeExchanger<T> {
    /// Create new exchanger.
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
impl<T: HttpTransport> AuthorizationCodeExchanger for DefaultAuthorizationCodeExchanger<T> {
    fn authorization_url(&self, state: &str, scopes: Option<&[String]>) -> AccessResult<String> {
        let scope = scopes.unwrap_or(self.config.scopes.as_slice()).join(" ");

        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.config.credentials.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }
        params.push(("state", state));

        let url = url::Url::parse_with_params(&self.config.provider.authorization_endpoint, &params)
            .map_err(|_| {
                AccessError::Configuration(ConfigurationError::InvalidEndpoint {
                    url: self.config.provider.authorization_endpoint.clone(),
                })
            })?;

        Ok(url.into())
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> AccessResult<TokenRecord> {
        let request = client_authenticated_post(
            &self.config,
            &self.config.provider.token_endpoint,
            &[
                ("grant_type", GrantType::AuthorizationCode.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
        );

        let issued_at = self.clock.now();
        let result = match self.transport.send(request).await {
            Ok(response) => parse_token_response(response),
            Err(error) => Err(error),
        };

        match result {
            Ok(response) => {
                self.metrics.record_token_exchange(true);
                let record = TokenRecord::from_response(response, issued_at, &self.config.scopes);
                debug!(
                    expires_at = %record.expires_at,
                    has_refresh = record.has_refresh_credential(),
                    "Authorization code exchanged"
                );
                Ok(record)
            }
            Err(error) => {
                self.metrics.record_token_exchange(false);
                warn!(error = %error, kind = %error.kind(), "Authorization code exchange failed");
                Err(error)
            }
        }
    }
}

/// Mock exchanger for testing.
#[derive(Default)]
pub struct MockAuthorizationCodeExchanger {
    exchange_history: Mutex<Vec<(String, String)>>,
    next_record: Mutex<Option<TokenRecord>>,
    next_error: Mutex<Option<AccessError>>,
}

impl MockAuthorizationCodeExchanger {
    /// Create new mock exchanger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set next record.
    pub fn set_next_record(&self, record: TokenRecord) -> &Self {
        *self.next_record.lock() = Some(record);
        self
    }

    /// Set next error.
    pub fn set_next_error(&self, error: AccessError) -> &Self {
        *self.next_error.lock() = Some(error);
        self
    }

    /// Get (code, redirect_uri) pairs exchanged so far.
    pub fn get_exchange_history(&self) -> Vec<(String, String)> {
        self.exchange_history.lock().clone()
    }
}

#[async_trait]
impl AuthorizationCodeExchanger for MockAuthorizationCodeExchanger {
    fn authorization_url(&self, state: &str, _scopes: Option<&[String]>) -> AccessResult<String> {
        Ok(format!("https://mock.example.com/authorize?state={}", state))
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> AccessResult<TokenRecord> {
        self.exchange_history
            .lock()
            .push((code.to_string(), redirect_uri.to_string()));

        if let Some(error) = self.next_error.lock().take() {
            return Err(error);
        }

        let record = self.next_record.lock().take();
        Ok(record.unwrap_or_else(|| {
            TokenRecord::new(
                "mock-access-token",
                chrono::Utc::now(),
                std::time::Duration::from_secs(3600),
            )
            .with_refresh_credential("mock-refresh-token")
        }))
    }
}

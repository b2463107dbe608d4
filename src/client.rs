//! Access Client
//!
//! High-level client wiring the credential lifecycle and call protection
//! from a single configuration.

use std::future::Future;
use std::sync::Arc;

use crate::core::{Clock, HttpTransport, ReqwestHttpTransport, SystemClock};
use crate::error::AccessResult;
use crate::flows::{
    DefaultAuthorizationCodeExchanger, DefaultTokenRefresher, DefaultUserInfoClient,
    UserInfoClient,
};
use crate::resilience::{CircuitBreakerRegistry, ResilientExecutor};
use crate::telemetry::{AccessMetrics, NoOpMetrics};
use crate::token::{
    CredentialStore, DefaultTokenManager, DefaultTokenRevoker, TokenManager, TokenManagerConfig,
};
use crate::types::{AccessConfig, AccessCredential, CredentialStatus, TokenRecord};

/// Target name used for user-info calls.
pub const USER_INFO_TARGET: &str = "provider-userinfo";

/// Access client for acting on behalf of principals.
pub struct AccessClient<T: HttpTransport = ReqwestHttpTransport> {
    config: Arc<AccessConfig>,
    manager: Arc<DefaultTokenManager>,
    executor: Arc<ResilientExecutor>,
    user_info: DefaultUserInfoClient<T>,
}

impl AccessClient<ReqwestHttpTransport> {
    /// Create a client with a reqwest transport and a memory-only store.
    pub fn new(config: AccessConfig) -> AccessResult<Self> {
        let transport = ReqwestHttpTransport::with_options(config.timeout, 1048576)?;
        Ok(Self::with_components(
            config,
            transport,
            CredentialStore::new(),
            Arc::new(SystemClock),
            Arc::new(NoOpMetrics),
        ))
    }
}

impl<T: HttpTransport + 'static> AccessClient<T> {
    /// Create a client with custom components.
    pub fn with_components(
        config: AccessConfig,
        transport: T,
        store: CredentialStore,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn AccessMetrics>,
    ) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(transport);

        let exchanger = DefaultAuthorizationCodeExchanger::new(config.clone(), transport.clone())
            .with_clock(clock.clone())
            .with_metrics(metrics.clone());
        let refresher = DefaultTokenRefresher::new(config.clone(), transport.clone())
            .with_clock(clock.clone())
            .with_metrics(metrics.clone());

        let mut manager = DefaultTokenManager::new(
            Arc::new(store),
            Arc::new(exchanger),
            Arc::new(refresher),
        )
        .with_config(TokenManagerConfig::new().safety_margin(config.safety_margin))
        .with_clock(clock.clone())
        .with_metrics(metrics.clone());

        if config.provider.revocation_endpoint.is_some() {
            manager = manager.with_revoker(Arc::new(DefaultTokenRevoker::new(
                config.clone(),
                transport.clone(),
            )));
        }

        let registry = CircuitBreakerRegistry::with_components(
            config.circuit_breaker.clone(),
            clock,
            metrics.clone(),
        );
        let executor =
            ResilientExecutor::new(Arc::new(registry), config.retry.clone()).with_metrics(metrics);

        Self {
            user_info: DefaultUserInfoClient::new(config.clone(), transport),
            config,
            manager: Arc::new(manager),
            executor: Arc::new(executor),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Token manager shared by this client.
    pub fn manager(&self) -> &Arc<DefaultTokenManager> {
        &self.manager
    }

    /// Executor shared by this client.
    pub fn executor(&self) -> &Arc<ResilientExecutor> {
        &self.executor
    }

    /// Build the provider authorization URL.
    pub fn authorization_url(&self, state: &str) -> AccessResult<String> {
        self.manager.authorization_url(state, None)
    }

    /// Exchange an authorization code for `principal` using the configured
    /// redirect target.
    pub async fn authorize(&self, principal: &str, code: &str) -> AccessResult<TokenRecord> {
        self.manager
            .authorize(principal, code, &self.config.redirect_uri)
            .await
    }

    /// Get a usable credential for `principal`.
    pub async fn get_usable_credential(&self, principal: &str) -> AccessResult<CredentialStatus> {
        self.manager.get_usable_credential(principal).await
    }

    /// Run an authenticated call for `principal` against `target` under the
    /// configured retry policy.
    pub async fn call<R, F, Fut>(&self, principal: &str, target: &str, operation: F) -> AccessResult<R>
    where
        F: FnMut(AccessCredential) -> Fut,
        Fut: Future<Output = AccessResult<R>>,
    {
        self.executor
            .execute_with_refresh(
                self.manager.as_ref(),
                principal,
                target,
                operation,
                &self.config.retry,
            )
            .await
    }

    /// Fetch the provider profile of `principal`.
    pub async fn user_info(&self, principal: &str) -> AccessResult<serde_json::Value> {
        self.call(principal, USER_INFO_TARGET, |credential| async move {
            self.user_info.user_info(&credential).await
        })
        .await
    }

    /// Log `principal` out, revoking at the provider when configured.
    pub async fn logout(&self, principal: &str) -> AccessResult<bool> {
        self.manager.invalidate(principal, true).await
    }
}

impl<T: HttpTransport> std::fmt::Debug for AccessClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessClient")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .field("executor", &self.executor)
            .finish()
    }
}

/// Create an access client with default components.
pub fn access_client(config: AccessConfig) -> AccessResult<AccessClient> {
    AccessClient::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::access_config;
    use crate::core::{ManualClock, MockHttpTransport};
    use crate::error::ErrorKind;
    use crate::resilience::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;

    fn client(transport: MockHttpTransport) -> AccessClient<MockHttpTransport> {
        let config = access_config()
            .client_id("ads-app")
            .client_secret("s3cret")
            .redirect_uri("https://app.example.com/callback")
            .authorization_endpoint("https://oauth.example.com/authorize")
            .token_endpoint("https://oauth.example.com/token")
            .revocation_endpoint("https://oauth.example.com/revoke")
            .userinfo_endpoint("https://oauth.example.com/userinfo")
            .retry_policy(
                RetryPolicy::default()
                    .initial_delay(Duration::from_millis(1))
                    .max_delay(Duration::from_millis(5)),
            )
            .build()
            .unwrap();

        AccessClient::with_components(
            config,
            transport,
            CredentialStore::new(),
            Arc::new(ManualClock::starting_now()),
            Arc::new(NoOpMetrics),
        )
    }

    #[tokio::test]
    async fn test_authorize_and_fetch_profile() {
        let transport = MockHttpTransport::new();
        transport
            .queue_json_response(
                200,
                &json!({"access_token": "at-1", "refresh_token": "rt-1", "expires_in": 3600}),
            )
            .queue_json_response(200, &json!({"sub": "user-42"}));
        let client = client(transport);

        client.authorize("user-1", "code-1").await.unwrap();
        let profile = client.user_info("user-1").await.unwrap();
        assert_eq!(profile["sub"], "user-42");
    }

    #[tokio::test]
    async fn test_rejected_credential_refreshes_once() {
        let transport = MockHttpTransport::new();
        transport
            .queue_json_response(
                200,
                &json!({"access_token": "at-1", "refresh_token": "rt-1", "expires_in": 3600}),
            )
            .queue_json_response(401, &json!({"error": "invalid_token"}))
            .queue_json_response(200, &json!({"access_token": "at-2", "expires_in": 3600}))
            .queue_json_response(200, &json!({"sub": "user-42"}));
        let client = client(transport);

        client.authorize("user-1", "code-1").await.unwrap();
        let profile = client.user_info("user-1").await.unwrap();
        assert_eq!(profile["sub"], "user-42");

        let status = client.get_usable_credential("user-1").await.unwrap();
        assert_eq!(status.credential().unwrap().secret(), "at-2");
    }

    #[tokio::test]
    async fn test_unknown_principal_requires_authorization() {
        let client = client(MockHttpTransport::new());
        let error = client.user_info("nobody").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidGrant);
        assert!(error.needs_interactive_auth());
    }

    #[tokio::test]
    async fn test_logout_revokes() {
        let transport = MockHttpTransport::new();
        transport
            .queue_json_response(
                200,
                &json!({"access_token": "at-1", "refresh_token": "rt-1"}),
            )
            .queue_json_response(200, &json!({}));
        let client = client(transport);

        client.authorize("user-1", "code-1").await.unwrap();
        assert!(client.logout("user-1").await.unwrap());
        assert!(!client.manager().has_usable_credential("user-1").await);
    }

    #[test]
    fn test_authorization_url_uses_config() {
        let client = client(MockHttpTransport::new());
        let url = client.authorization_url("state-1").unwrap();
        assert!(url.starts_with("https://oauth.example.com/authorize?"));
        assert!(url.contains("state=state-1"));
    }
}

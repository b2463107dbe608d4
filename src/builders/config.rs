//! Configuration Builder
//!
//! Fluent builder for access layer configuration.

use secrecy::SecretString;
use std::time::Duration;

use crate::error::{AccessError, AccessResult, ConfigurationError};
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::types::{
    AccessConfig, AccessSettings, ClientAuthMethod, ClientCredentials, ProviderConfig,
    DEFAULT_SAFETY_MARGIN_SECS, DEFAULT_TIMEOUT_SECS,
};

/// Access configuration builder.
#[derive(Default)]
pub struct AccessConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    auth_method: Option<ClientAuthMethod>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    revocation_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
    timeout: Duration,
    safety_margin: Duration,
    retry: RetryPolicy,
    circuit_breaker: CircuitBreakerConfig,
}

impl AccessConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            safety_margin: Duration::from_secs(DEFAULT_SAFETY_MARGIN_SECS),
            ..Default::default()
        }
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set client authentication method.
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    /// Set authorization endpoint.
    pub fn authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(endpoint.into());
        self
    }

    /// Set token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set revocation endpoint.
    pub fn revocation_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.revocation_endpoint = Some(endpoint.into());
        self
    }

    /// Set userinfo endpoint.
    pub fn userinfo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    /// Set redirect target registered with the provider.
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set requested scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Add a requested scope.
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set refresh safety margin.
    pub fn safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Set retry policy for wrapped calls.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Configure endpoints from a provider config.
    pub fn from_provider_config(mut self, provider: ProviderConfig) -> Self {
        self.authorization_endpoint = Some(provider.authorization_endpoint);
        self.token_endpoint = Some(provider.token_endpoint);
        self.revocation_endpoint = provider.revocation_endpoint;
        self.userinfo_endpoint = provider.userinfo_endpoint;
        self
    }

    /// Build the access configuration.
    pub fn build(self) -> AccessResult<AccessConfig> {
        let client_id = required(self.client_id, "client_id")?;
        let redirect_uri = required(self.redirect_uri, "redirect_uri")?;
        let authorization_endpoint =
            required(self.authorization_endpoint, "authorization_endpoint")?;
        let token_endpoint = required(self.token_endpoint, "token_endpoint")?;

        for endpoint in [&authorization_endpoint, &token_endpoint, &redirect_uri]
            .into_iter()
            .chain(self.revocation_endpoint.as_ref())
            .chain(self.userinfo_endpoint.as_ref())
        {
            validate_url(endpoint)?;
        }

        if client_id.trim().is_empty() {
            return Err(invalid("client_id must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(invalid("initial retry delay exceeds max retry delay"));
        }

        Ok(AccessConfig {
            provider: ProviderConfig {
                authorization_endpoint,
                token_endpoint,
                revocation_endpoint: self.revocation_endpoint,
                userinfo_endpoint: self.userinfo_endpoint,
            },
            credentials: ClientCredentials {
                client_id,
                client_secret: self.client_secret,
                auth_method: self.auth_method.unwrap_or_default(),
            },
            redirect_uri,
            scopes: self.scopes,
            timeout: self.timeout,
            safety_margin: self.safety_margin,
            retry: self.retry,
            circuit_breaker: self.circuit_breaker,
        })
    }
}

impl From<AccessSettings> for AccessConfigBuilder {
    fn from(settings: AccessSettings) -> Self {
        let mut builder = AccessConfigBuilder::new()
            .client_id(settings.client_id)
            .auth_method(settings.auth_method)
            .redirect_uri(settings.redirect_uri)
            .scopes(settings.scopes)
            .authorization_endpoint(settings.authorization_endpoint)
            .token_endpoint(settings.token_endpoint)
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .safety_margin(Duration::from_secs(settings.safety_margin_seconds))
            .retry_policy(RetryPolicy::from_seconds(
                settings.max_retry_attempts,
                settings.initial_retry_delay_seconds,
                settings.max_retry_delay_seconds,
            ))
            .circuit_breaker(
                CircuitBreakerConfig::new()
                    .failure_threshold(settings.failure_threshold)
                    .reset_timeout(Duration::from_secs(settings.recovery_timeout_seconds)),
            );

        builder.client_secret = settings.client_secret;
        builder.revocation_endpoint = settings.revocation_endpoint;
        builder.userinfo_endpoint = settings.userinfo_endpoint;
        builder
    }
}

impl AccessSettings {
    /// Resolve the settings into a validated configuration.
    pub fn into_config(self) -> AccessResult<AccessConfig> {
        AccessConfigBuilder::from(self).build()
    }
}

/// Create a new access configuration builder.
pub fn access_config() -> AccessConfigBuilder {
    AccessConfigBuilder::new()
}

fn required(value: Option<String>, field: &str) -> AccessResult<String> {
    value.ok_or_else(|| {
        AccessError::Configuration(ConfigurationError::MissingRequired {
            field: field.to_string(),
        })
    })
}

fn validate_url(value: &str) -> AccessResult<()> {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(AccessError::Configuration(
            ConfigurationError::InvalidEndpoint {
                url: value.to_string(),
            },
        )),
    }
}

fn invalid(message: &str) -> AccessError {
    AccessError::Configuration(ConfigurationError::InvalidConfig {
        message: message.to_string(),
    })
}

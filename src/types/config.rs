//! Configuration Types
//!
//! Provider, client and resilience configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Access layer configuration.
#[derive(Clone, Debug)]
pub struct AccessConfig {
    /// Provider configuration.
    pub provider: ProviderConfig,
    /// Client credentials.
    pub credentials: ClientCredentials,
    /// Redirect target registered with the provider.
    pub redirect_uri: String,
    /// Scopes to request.
    pub scopes: Vec<String>,
    /// HTTP timeout.
    pub timeout: Duration,
    /// Refresh this long before expiry.
    pub safety_margin: Duration,
    /// Retry policy for wrapped calls.
    pub retry: RetryPolicy,
    /// Breaker configuration shared by all targets.
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Provider endpoint configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Token revocation endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    /// User-info endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
}

/// Client credentials for provider authentication.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: Option<SecretString>,
    /// Client authentication method.
    pub auth_method: ClientAuthMethod,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Client authentication method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// client_id and client_secret in request body.
    ClientSecretPost,
    /// HTTP Basic Authentication header.
    #[default]
    ClientSecretBasic,
}

/// Grant type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Flat settings as a host configuration file spells them.
///
/// Durations are whole seconds; everything is resolved once into an
/// [`AccessConfig`] through [`crate::AccessConfigBuilder`].
#[derive(Clone, Deserialize)]
pub struct AccessSettings {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub auth_method: ClientAuthMethod,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_safety_margin_seconds")]
    pub safety_margin_seconds: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_seconds")]
    pub initial_retry_delay_seconds: f64,
    #[serde(default = "default_max_retry_delay_seconds")]
    pub max_retry_delay_seconds: f64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_seconds")]
    pub recovery_timeout_seconds: u64,
}

impl std::fmt::Debug for AccessSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_endpoint", &self.token_endpoint)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("failure_threshold", &self.failure_threshold)
            .finish_non_exhaustive()
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_safety_margin_seconds() -> u64 {
    DEFAULT_SAFETY_MARGIN_SECS
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_seconds() -> f64 {
    1.0
}

fn default_max_retry_delay_seconds() -> f64 {
    30.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_seconds() -> u64 {
    60
}

/// Default configuration values.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;

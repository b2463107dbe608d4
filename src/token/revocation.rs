//! Token Revocation
//!
//! RFC 7009 - OAuth 2.0 Token Revocation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::core::HttpTransport;
use crate::error::{create_error_from_response, AccessError, AccessResult, ConfigurationError};
use crate::flows::token_endpoint::client_authenticated_post;
use crate::types::AccessConfig;

/// Which credential is being revoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Token revoker interface.
#[async_trait]
pub trait TokenRevoker: Send + Sync {
    /// Revoke a credential at the provider.
    async fn revoke(&self, token: &str, hint: TokenTypeHint) -> AccessResult<()>;
}

/// Revoker calling the provider revocation endpoint.
pub struct DefaultTokenRevoker<T: HttpTransport> {
    config: Arc<AccessConfig>,
    transport: Arc<T>,
}

impl<T: HttpTransport> DefaultTokenRevoker<T> {
    /// Create new token revoker.
    pub fn new(config: Arc<AccessConfig>, transport: Arc<T>) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl<T: HttpTransport> TokenRevoker for DefaultTokenRevoker<T> {
    async fn revoke(&self, token: &str, hint: TokenTypeHint) -> AccessResult<()> {
        let endpoint = self.config.provider.revocation_endpoint.as_ref().ok_or_else(|| {
            AccessError::Configuration(ConfigurationError::MissingRequired {
                field: "revocation_endpoint".to_string(),
            })
        })?;

        let request = client_authenticated_post(
            &self.config,
            endpoint,
            &[("token", token), ("token_type_hint", hint.as_str())],
        );

        let response = self.transport.send(request).await?;

        // RFC 7009: 200 also covers tokens the server no longer knows.
        if !response.is_success() {
            return Err(create_error_from_response(response.status, &response.body));
        }

        debug!(hint = hint.as_str(), "Token revoked");
        Ok(())
    }
}

/// Mock token revoker for testing.
#[derive(Default)]
pub struct MockTokenRevoker {
    revoke_history: Mutex<Vec<(String, TokenTypeHint)>>,
    next_error: Mutex<Option<AccessError>>,
}

impl MockTokenRevoker {
    /// Create new mock revoker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set next error.
    pub fn set_next_error(&self, error: AccessError) -> &Self {
        *self.next_error.lock() = Some(error);
        self
    }

    /// Get revocation history.
    pub fn get_revoke_history(&self) -> Vec<(String, TokenTypeHint)> {
        self.revoke_history.lock().clone()
    }

    /// Check if a specific token was revoked.
    pub fn was_revoked(&self, token: &str) -> bool {
        self.revoke_history.lock().iter().any(|(t, _)| t == token)
    }
}

#[async_trait]
impl TokenRevoker for MockTokenRevoker {
    async fn revoke(&self, token: &str, hint: TokenTypeHint) -> AccessResult<()> {
        if let Some(error) = self.next_error.lock().take() {
            return Err(error);
        }

        self.revoke_history.lock().push((token.to_string(), hint));
        Ok(())
    }
}

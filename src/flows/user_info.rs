//! User Info
//!
//! Fetches the profile of the principal owning an access credential.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::core::{HttpRequest, HttpTransport};
use crate::error::{
    create_error_from_api_response, AccessError, AccessResult, ConfigurationError, ProtocolError,
};
use crate::types::{AccessConfig, AccessCredential};

/// User-info client interface.
#[async_trait]
pub trait UserInfoClient: Send + Sync {
    /// Fetch the profile JSON as the provider returns it.
    async fn user_info(&self, credential: &AccessCredential) -> AccessResult<serde_json::Value>;
}

/// User-info client calling the provider endpoint.
pub struct DefaultUserInfoClient<T: HttpTransport> {
    config: Arc<AccessConfig>,
    transport: Arc<T>,
}

impl<T: HttpTransport> DefaultUserInfoClient<T> {
    /// Create new user-info client.
    pub fn new(config: Arc<AccessConfig>, transport: Arc<T>) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl<T: HttpTransport> UserInfoClient for DefaultUserInfoClient<T> {
    async fn user_info(&self, credential: &AccessCredential) -> AccessResult<serde_json::Value> {
        let endpoint = self.config.provider.userinfo_endpoint.as_ref().ok_or_else(|| {
            AccessError::Configuration(ConfigurationError::MissingRequired {
                field: "userinfo_endpoint".to_string(),
            })
        })?;

        let request = HttpRequest::get(endpoint.as_str())
            .header("authorization", credential.authorization_header())
            .with_timeout(self.config.timeout);

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(create_error_from_api_response(
                response.status,
                response.retry_after(),
                &response.body,
            ));
        }

        debug!("User info fetched");

        serde_json::from_str(&response.body).map_err(|e| {
            AccessError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })
    }
}

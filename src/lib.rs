//! Advertising API Access Layer
//!
//! OAuth2 credential lifecycle and outbound call protection for integrations
//! that act on behalf of end users against a third-party advertising API.
//!
//! # Features
//!
//! - Authorization Code exchange (RFC 6749 Section 4.1)
//! - Token Refresh (RFC 6749 Section 6), single-flight per principal
//! - Token Revocation (RFC 7009)
//! - Retry with exponential backoff
//! - Per-target circuit breakers
//!
//! # Example
//!
//! ```rust,ignore
//! use ads_access::{access_client, access_config, CredentialStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = access_config()
//!         .client_id("my-client-id")
//!         .client_secret("my-client-secret")
//!         .authorization_endpoint("https://provider.com/authorize")
//!         .token_endpoint("https://provider.com/token")
//!         .redirect_uri("https://myapp.com/oauth/callback")
//!         .add_scope("ads:read")
//!         .build()?;
//!
//!     let client = access_client(config)?;
//!
//!     // Route layer: redirect the user, then hand back the code.
//!     println!("Authorize at: {}", client.authorization_url("opaque-state")?);
//!     client.authorize("user-42", "code-from-callback").await?;
//!
//!     let campaigns = client
//!         .call("user-42", "campaigns", |credential| async move {
//!             fetch_campaigns(credential.authorization_header()).await
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: token records and configuration
//! - `error`: error hierarchy and failure classification
//! - `core`: HTTP transport and clock seams
//! - `flows`: provider round trips (exchange, refresh, user info)
//! - `token`: credential store, token manager, revocation
//! - `resilience`: retry policy, circuit breakers, executor, fallback
//! - `telemetry`: metrics
//! - `builders`: fluent configuration builder
//! - `client`: high-level client combining all of the above

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod flows;
pub mod resilience;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{access_client, AccessClient};

// Re-export builders
pub use builders::{access_config, AccessConfigBuilder};

// Re-export errors
pub use error::{
    create_error_from_api_response, create_error_from_response, map_token_error,
    parse_error_response, AccessError, AccessResult, ConfigurationError, ErrorKind, NetworkError,
    OAuth2ErrorResponse, ProtocolError, ProviderError, ResilienceError, StorageError, TokenError,
};

// Re-export types
pub use types::{
    // Config
    AccessConfig, AccessSettings, ClientAuthMethod, ClientCredentials, GrantType,
    ProviderConfig,
    // Token
    AccessCredential, CredentialStatus, TokenRecord, TokenResponse,
};

// Re-export core components
pub use crate::core::{
    Clock, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ManualClock, MockHttpTransport,
    ReqwestHttpTransport, SystemClock,
};

// Re-export flows
pub use flows::{
    AuthorizationCodeExchanger, DefaultAuthorizationCodeExchanger, DefaultTokenRefresher,
    DefaultUserInfoClient, TokenRefresher, UserInfoClient,
};

// Re-export token management
pub use token::{
    CredentialStore, DefaultTokenManager, DefaultTokenRevoker, InMemoryTokenPersistence,
    StoreEntry, TokenManager, TokenManagerConfig, TokenPersistence, TokenRevoker, TokenTypeHint,
};

// Re-export resilience
pub use resilience::{
    fallback_on_error, with_fallback, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerRegistry, CircuitState, ResilientExecutor, RetryAttempt, RetryPolicy,
};

// Re-export telemetry
pub use telemetry::{AccessMetrics, InMemoryMetrics, NoOpMetrics};

//! Access Layer Error Types
//!
//! Error hierarchy for credential lifecycle and resilient API calls.
//!
//! Every failure is classified exactly once, when it is observed, by choosing
//! the variant that gets constructed. [`AccessError::kind`] derives the
//! [`ErrorKind`] from that variant, so the classification cannot drift as the
//! error propagates.

use std::time::Duration;
use thiserror::Error;

/// Root error type for the access layer.
#[derive(Error, Debug, Clone)]
pub enum AccessError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Resilience error: {0}")]
    Resilience(#[from] ResilienceError),
}

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Connection, DNS or timeout failure.
    TransientNetwork,
    /// Refresh or authorization credential rejected by the provider.
    InvalidGrant,
    /// Provider asked us to slow down.
    ProviderRateLimited,
    /// Provider-side failure (5xx, temporarily unavailable).
    ProviderServerError,
    /// Access credential rejected on an API call.
    Unauthorized,
    /// Request rejected for reasons other than the credential.
    InvalidRequest,
    /// Breaker refused the call without attempting it.
    CircuitOpen,
    /// All attempts were used up.
    RetriesExhausted,
    /// Caller cancelled between attempts.
    Cancelled,
    Configuration,
    Protocol,
    Storage,
}

impl ErrorKind {
    /// Kinds retried by the default retry policy.
    pub const DEFAULT_RETRYABLE: [ErrorKind; 3] = [
        ErrorKind::TransientNetwork,
        ErrorKind::ProviderRateLimited,
        ErrorKind::ProviderServerError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::InvalidGrant => "invalid_grant",
            Self::ProviderRateLimited => "provider_rate_limited",
            Self::ProviderServerError => "provider_server_error",
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest => "invalid_request",
            Self::CircuitOpen => "circuit_open",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Cancelled => "cancelled",
            Self::Configuration => "configuration",
            Self::Protocol => "protocol",
            Self::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AccessError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network(_) => ErrorKind::TransientNetwork,
            Self::Provider(e) => e.kind(),
            Self::Token(TokenError::Unauthorized { .. }) => ErrorKind::Unauthorized,
            Self::Token(_) => ErrorKind::InvalidGrant,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Resilience(ResilienceError::CircuitOpen { .. }) => ErrorKind::CircuitOpen,
            Self::Resilience(ResilienceError::RetriesExhausted { .. }) => {
                ErrorKind::RetriesExhausted
            }
            Self::Resilience(ResilienceError::Cancelled) => ErrorKind::Cancelled,
        }
    }

    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ACCESS_CONFIG",
            Self::Network(_) => "ACCESS_NETWORK",
            Self::Provider(_) => "ACCESS_PROVIDER",
            Self::Token(_) => "ACCESS_TOKEN",
            Self::Storage(_) => "ACCESS_STORAGE",
            Self::Protocol(_) => "ACCESS_PROTOCOL",
            Self::Resilience(_) => "ACCESS_RESILIENCE",
        }
    }

    /// Check if the error is retryable under the default policy.
    pub fn is_retryable(&self) -> bool {
        ErrorKind::DEFAULT_RETRYABLE.contains(&self.kind())
    }

    /// Check if the error reflects provider availability.
    ///
    /// Credential problems never count, whatever the breaker configuration.
    pub fn counts_toward_breaker(&self) -> bool {
        self.is_retryable()
    }

    /// Check if the principal has to go through authorization again.
    pub fn needs_interactive_auth(&self) -> bool {
        self.kind() == ErrorKind::InvalidGrant
    }

    /// Get retry-after duration if the provider supplied one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after }) => *retry_after,
            Self::Provider(ProviderError::TemporarilyUnavailable { retry_after }) => *retry_after,
            _ => None,
        }
    }

    /// Get a user-facing message.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidGrant | ErrorKind::Unauthorized => {
                "Your advertising account connection has expired. Please reconnect it."
            }
            ErrorKind::CircuitOpen | ErrorKind::RetriesExhausted => {
                "The advertising service is temporarily unavailable. Please try again later."
            }
            ErrorKind::ProviderRateLimited => {
                "Too many requests. Please wait a moment and try again."
            }
            ErrorKind::TransientNetwork => {
                "The request timed out. Please check your connection and try again."
            }
            _ => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration error.
#[derive(Error, Debug, Clone)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },
}

/// Network/transport error.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("DNS resolution failed: {host}")]
    DnsResolutionFailed { host: String },
}

/// Provider (OAuth2 server or advertising API) error.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Invalid client credentials")]
    InvalidClient { error_description: Option<String> },

    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid scope: {scope}")]
    InvalidScope { scope: String },

    #[error("Unauthorized client for this grant type")]
    UnauthorizedClient { error_description: Option<String> },

    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType { grant_type: String },

    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Server temporarily unavailable")]
    TemporarilyUnavailable { retry_after: Option<Duration> },
}

impl ProviderError {
    /// Classify the provider error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGrant { .. } => ErrorKind::InvalidGrant,
            Self::RateLimited { .. } => ErrorKind::ProviderRateLimited,
            Self::ServerError { .. } | Self::TemporarilyUnavailable { .. } => {
                ErrorKind::ProviderServerError
            }
            Self::InvalidClient { .. }
            | Self::InvalidRequest { .. }
            | Self::InvalidScope { .. }
            | Self::UnauthorizedClient { .. }
            | Self::UnsupportedGrantType { .. } => ErrorKind::InvalidRequest,
        }
    }
}

/// Token lifecycle error.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    #[error("Interactive authorization required for principal {principal}")]
    InteractiveAuthRequired { principal: String },

    #[error("Access credential rejected: {message}")]
    Unauthorized { message: String },

    #[error("No refresh credential available")]
    NoRefreshToken,
}

/// Persistence hook error.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Delete failed: {message}")]
    DeleteFailed { message: String },
}

/// Protocol/response parsing error.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Errors synthesized by the resilient executor.
#[derive(Error, Debug, Clone)]
pub enum ResilienceError {
    #[error("Circuit breaker for {target} is open")]
    CircuitOpen { target: String },

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<AccessError>,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for access layer operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// OAuth2 error response body (RFC 6749 Section 5.2).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Map token endpoint error response to error type.
pub fn map_token_error(response: &OAuth2ErrorResponse) -> ProviderError {
    let description = || {
        response
            .error_description
            .clone()
            .unwrap_or_else(|| response.error.clone())
    };

    match response.error.as_str() {
        "invalid_client" => ProviderError::InvalidClient {
            error_description: response.error_description.clone(),
        },
        // Some providers report revoked refresh tokens as invalid_token.
        "invalid_grant" | "invalid_token" => ProviderError::InvalidGrant {
            message: description(),
        },
        "invalid_scope" => ProviderError::InvalidScope {
            scope: response.error_description.clone().unwrap_or_default(),
        },
        "unauthorized_client" => ProviderError::UnauthorizedClient {
            error_description: response.error_description.clone(),
        },
        "unsupported_grant_type" => ProviderError::UnsupportedGrantType {
            grant_type: response.error_description.clone().unwrap_or_default(),
        },
        "server_error" => ProviderError::ServerError {
            status: 500,
            message: description(),
        },
        "temporarily_unavailable" => ProviderError::TemporarilyUnavailable { retry_after: None },
        _ => ProviderError::InvalidRequest {
            message: description(),
        },
    }
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Create error from a non-2xx token endpoint response.
///
/// Status codes that describe availability (429, 5xx) win over the body.
pub fn create_error_from_response(status: u16, body: &str) -> AccessError {
    if status == 429 {
        return ProviderError::RateLimited { retry_after: None }.into();
    }

    let parsed = parse_error_response(body);

    if status >= 500 {
        return match parsed {
            Some(response) if response.error == "temporarily_unavailable" => {
                ProviderError::TemporarilyUnavailable { retry_after: None }.into()
            }
            _ => ProviderError::ServerError {
                status,
                message: format!("HTTP {}", status),
            }
            .into(),
        };
    }

    if let Some(response) = parsed {
        return map_token_error(&response).into();
    }

    let error = match status {
        401 => ProviderError::InvalidClient {
            error_description: Some("Unauthorized".to_string()),
        },
        403 => ProviderError::UnauthorizedClient {
            error_description: Some("Forbidden".to_string()),
        },
        _ => ProviderError::InvalidRequest {
            message: format!("HTTP {}", status),
        },
    };

    error.into()
}

/// Create error from a non-2xx advertising API response.
///
/// Used by wrapped operations so their failures carry the right kind.
pub fn create_error_from_api_response(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> AccessError {
    match status {
        401 => TokenError::Unauthorized {
            message: truncate(body, 200),
        }
        .into(),
        429 => ProviderError::RateLimited { retry_after }.into(),
        503 => ProviderError::TemporarilyUnavailable { retry_after }.into(),
        s if s >= 500 => ProviderError::ServerError {
            status: s,
            message: truncate(body, 200),
        }
        .into(),
        s => ProviderError::InvalidRequest {
            message: format!("HTTP {}: {}", s, truncate(body, 200)),
        }
        .into(),
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let timeout = AccessError::Network(NetworkError::Timeout {
            timeout: Duration::from_secs(30),
        });
        assert_eq!(timeout.kind(), ErrorKind::TransientNetwork);
        assert!(timeout.is_retryable());
        assert!(timeout.counts_toward_breaker());

        let grant = AccessError::Provider(ProviderError::InvalidGrant {
            message: "revoked".to_string(),
        });
        assert_eq!(grant.kind(), ErrorKind::InvalidGrant);
        assert!(!grant.is_retryable());
        assert!(!grant.counts_toward_breaker());
        assert!(grant.needs_interactive_auth());

        let open = AccessError::Resilience(ResilienceError::CircuitOpen {
            target: "ads".to_string(),
        });
        assert_eq!(open.kind(), ErrorKind::CircuitOpen);
        assert!(!open.is_retryable());
    }

    #[test]
    fn test_invalid_grant_response() {
        let body = r#"{"error":"invalid_grant","error_description":"Token has been revoked"}"#;
        let error = create_error_from_response(400, body);
        assert_eq!(error.kind(), ErrorKind::InvalidGrant);
        assert!(error.to_string().contains("Token has been revoked"));
    }

    #[test]
    fn test_status_overrides_body() {
        let body = r#"{"error":"invalid_request"}"#;
        assert_eq!(
            create_error_from_response(429, body).kind(),
            ErrorKind::ProviderRateLimited
        );
        assert_eq!(
            create_error_from_response(502, body).kind(),
            ErrorKind::ProviderServerError
        );
        assert_eq!(
            create_error_from_response(400, "not json").kind(),
            ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn test_api_response_classification() {
        assert_eq!(
            create_error_from_api_response(401, None, "expired").kind(),
            ErrorKind::Unauthorized
        );
        let limited = create_error_from_api_response(429, Some(Duration::from_secs(5)), "");
        assert_eq!(limited.kind(), ErrorKind::ProviderRateLimited);
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(
            create_error_from_api_response(400, None, "bad field").kind(),
            ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn test_retries_exhausted_keeps_last_error() {
        let error = AccessError::Resilience(ResilienceError::RetriesExhausted {
            attempts: 3,
            last: Box::new(AccessError::Network(NetworkError::ConnectionFailed {
                message: "reset by peer".to_string(),
            })),
        });
        assert_eq!(error.kind(), ErrorKind::RetriesExhausted);
        assert!(error.to_string().contains("reset by peer"));
        assert_eq!(
            error.user_message(),
            "The advertising service is temporarily unavailable. Please try again later."
        );
    }
}

//! Token Endpoint
//!
//! Request building and response handling shared by the grants.

use base64::Engine;
use secrecy::ExposeSecret;

use crate::core::{HttpRequest, HttpResponse};
use crate::error::{create_error_from_response, AccessError, AccessResult, ProtocolError};
use crate::types::{AccessConfig, ClientAuthMethod, TokenResponse};

/// Build a form POST to `endpoint` carrying client authentication.
///
/// `client_id` always goes in the body; the secret goes either in a Basic
/// header or in the body, depending on the configured method.
pub(crate) fn client_authenticated_post(
    config: &AccessConfig,
    endpoint: &str,
    params: &[(&str, &str)],
) -> HttpRequest {
    let credentials = &config.credentials;
    let secret = credentials
        .client_secret
        .as_ref()
        .map(|secret| secret.expose_secret().as_str());

    let mut form: Vec<(&str, &str)> = params.to_vec();
    form.push(("client_id", credentials.client_id.as_str()));

    if credentials.auth_method == ClientAuthMethod::ClientSecretPost {
        if let Some(secret) = secret {
            form.push(("client_secret", secret));
        }
    }

    let mut request = HttpRequest::form_post(endpoint, &form).with_timeout(config.timeout);

    if credentials.auth_method == ClientAuthMethod::ClientSecretBasic {
        if let Some(secret) = secret {
            let encoded = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", credentials.client_id, secret));
            request = request.header("authorization", format!("Basic {}", encoded));
        }
    }

    request
}

/// Turn a token endpoint reply into a token response or a classified error.
pub(crate) fn parse_token_response(response: HttpResponse) -> AccessResult<TokenResponse> {
    if !response.is_success() {
        let error = create_error_from_response(response.status, &response.body);
        return Err(with_retry_after(error, &response));
    }

    serde_json::from_str(&response.body).map_err(|e| {
        AccessError::Protocol(ProtocolError::InvalidJson {
            message: e.to_string(),
        })
    })
}

fn with_retry_after(error: AccessError, response: &HttpResponse) -> AccessError {
    use crate::error::ProviderError;

    let hint = response.retry_after();
    match error {
        AccessError::Provider(ProviderError::RateLimited { retry_after: None }) => {
            ProviderError::RateLimited { retry_after: hint }.into()
        }
        AccessError::Provider(ProviderError::TemporarilyUnavailable { retry_after: None }) => {
            ProviderError::TemporarilyUnavailable { retry_after: hint }.into()
        }
        other => other,
    }
}

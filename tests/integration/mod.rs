//! Integration tests using WireMock
//!
//! These tests drive the real reqwest transport against a mock provider and a
//! mock advertising API.

pub mod resilient_calls;
pub mod token_lifecycle;

use std::sync::Arc;
use std::time::Duration;

use ads_access::{
    access_config, AccessClient, AccessConfigBuilder, AccessResult, CredentialStore,
    InMemoryMetrics, ManualClock, ReqwestHttpTransport, RetryPolicy,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a mock server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Configuration pointing every endpoint at `server`.
pub fn config_for(server: &MockServer) -> AccessConfigBuilder {
    access_config()
        .client_id("ads-app")
        .client_secret("s3cret")
        .redirect_uri("https://app.example.com/oauth/callback")
        .authorization_endpoint(format!("{}/oauth/authorize", server.uri()))
        .token_endpoint(format!("{}/oauth/token", server.uri()))
        .revocation_endpoint(format!("{}/oauth/revoke", server.uri()))
        .userinfo_endpoint(format!("{}/oauth/userinfo", server.uri()))
        .add_scope("ads:read")
        .retry_policy(
            RetryPolicy::default()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(50)),
        )
}

/// Test fixture around a client on a manual clock.
pub struct Fixture {
    pub client: AccessClient,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<InMemoryMetrics>,
}

pub fn fixture(builder: AccessConfigBuilder) -> Fixture {
    let clock = Arc::new(ManualClock::starting_now());
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = AccessClient::with_components(
        builder.build().expect("valid config"),
        ReqwestHttpTransport::new().expect("transport"),
        CredentialStore::new(),
        clock.clone(),
        metrics.clone(),
    );
    Fixture {
        client,
        clock,
        metrics,
    }
}

/// Mount a one-shot authorization-code grant.
pub async fn mount_code_grant(server: &MockServer, access: &str, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(token_response(access, Some("rt-1"), expires_in))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Helper to create token endpoint responses.
pub fn token_response(access: &str, refresh: Option<&str>, expires_in: u64) -> ResponseTemplate {
    let mut body = json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": expires_in,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    ResponseTemplate::new(200).set_body_json(body)
}

/// Helper to create error response templates.
pub fn error_response(status: u16, error_body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(error_body)
}

/// GET an advertising API path with the given Authorization header.
pub async fn api_get(url: String, authorization: String) -> AccessResult<serde_json::Value> {
    let response = reqwest::Client::new()
        .get(url)
        .header("authorization", authorization)
        .send()
        .await
        .map_err(|e| {
            ads_access::AccessError::Network(ads_access::NetworkError::ConnectionFailed {
                message: e.to_string(),
            })
        })?;

    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    if !(200..300).contains(&status) {
        return Err(ads_access::create_error_from_api_response(
            status,
            retry_after,
            &body,
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        ads_access::AccessError::Protocol(ads_access::ProtocolError::InvalidJson {
            message: e.to_string(),
        })
    })
}

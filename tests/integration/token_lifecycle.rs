//! Integration tests for the credential lifecycle

use super::*;
use ads_access::{CredentialStatus, ErrorKind, TokenManager};
use futures::future::join_all;
use wiremock::matchers::{header, header_exists};

fn secret(status: &CredentialStatus) -> String {
    status
        .credential()
        .expect("usable credential")
        .secret()
        .to_string()
}

#[tokio::test]
async fn test_exchange_then_get_makes_no_refresh() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=code-123"))
        .and(header_exists("authorization"))
        .respond_with(token_response("at-1", Some("rt-1"), 3600))
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    let record = f.client.authorize("user-1", "code-123").await.unwrap();
    assert!(record.scope_set.contains("ads:read"));

    for _ in 0..3 {
        let status = f.client.get_usable_credential("user-1").await.unwrap();
        assert_eq!(secret(&status), "at-1");
    }
    assert_eq!(f.metrics.count("token_refresh"), 0);
}

#[tokio::test]
async fn test_refresh_after_expiry() {
    let server = setup_mock_server().await;
    mount_code_grant(&server, "at-1", 3600).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(token_response("at-2", None, 3600))
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    f.client.authorize("user-1", "code-1").await.unwrap();

    f.clock.advance(Duration::from_secs(100));
    let status = f.client.get_usable_credential("user-1").await.unwrap();
    assert_eq!(secret(&status), "at-1");

    f.clock.advance(Duration::from_secs(3460));
    let status = f.client.get_usable_credential("user-1").await.unwrap();
    assert_eq!(secret(&status), "at-2");

    let stored = f.client.manager().store().get_cached("user-1").unwrap();
    assert_eq!(stored.record().refresh_credential(), Some("rt-1"));
}

#[tokio::test]
async fn test_concurrent_callers_trigger_one_refresh() {
    let server = setup_mock_server().await;
    mount_code_grant(&server, "at-1", 30).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            token_response("at-2", Some("rt-2"), 3600).set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    f.client.authorize("user-1", "code-1").await.unwrap();

    let results = join_all((0..8).map(|_| f.client.get_usable_credential("user-1"))).await;
    for result in results {
        assert_eq!(secret(&result.unwrap()), "at-2");
    }
    assert_eq!(f.metrics.count("token_refresh"), 1);
}

#[tokio::test]
async fn test_revoked_refresh_credential_requires_authorization() {
    let server = setup_mock_server().await;
    mount_code_grant(&server, "at-1", 30).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(error_response(
            400,
            json!({"error": "invalid_grant", "error_description": "Token has been revoked"}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    f.client.authorize("user-1", "code-1").await.unwrap();

    let status = f.client.get_usable_credential("user-1").await.unwrap();
    assert!(matches!(status, CredentialStatus::NeedsInteractiveAuth));

    // Marked invalid: no second refresh.
    let status = f.client.get_usable_credential("user-1").await.unwrap();
    assert!(matches!(status, CredentialStatus::NeedsInteractiveAuth));
    assert!(!f.client.manager().has_usable_credential("user-1").await);
}

#[tokio::test]
async fn test_reauthorization_replaces_invalid_entry() {
    let server = setup_mock_server().await;
    mount_code_grant(&server, "at-1", 30).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(error_response(400, json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;
    mount_code_grant(&server, "at-new", 3600).await;

    let f = fixture(config_for(&server));
    f.client.authorize("user-1", "code-1").await.unwrap();
    f.client.get_usable_credential("user-1").await.unwrap();

    f.client.authorize("user-1", "code-2").await.unwrap();
    let status = f.client.get_usable_credential("user-1").await.unwrap();
    assert_eq!(secret(&status), "at-new");
}

#[tokio::test]
async fn test_provider_outage_during_refresh_is_an_error() {
    let server = setup_mock_server().await;
    mount_code_grant(&server, "at-1", 30).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(error_response(503, json!({"error": "temporarily_unavailable"})))
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    f.client.authorize("user-1", "code-1").await.unwrap();

    let error = f.client.get_usable_credential("user-1").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ProviderServerError);
    assert!(f.client.manager().has_usable_credential("user-1").await);
}

#[tokio::test]
async fn test_invalid_code_is_classified() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(error_response(400, json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    let error = f.client.authorize("user-1", "stale-code").await.unwrap_err();
    assert!(error.needs_interactive_auth());
    assert!(f.client.manager().store().is_empty());
}

#[tokio::test]
async fn test_logout_revokes_refresh_credential() {
    let server = setup_mock_server().await;
    mount_code_grant(&server, "at-1", 3600).await;
    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .and(body_string_contains("token=rt-1"))
        .and(body_string_contains("token_type_hint=refresh_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    f.client.authorize("user-1", "code-1").await.unwrap();

    assert!(f.client.logout("user-1").await.unwrap());
    let status = f.client.get_usable_credential("user-1").await.unwrap();
    assert!(!status.is_usable());
}

#[tokio::test]
async fn test_user_info_with_bearer() {
    let server = setup_mock_server().await;
    mount_code_grant(&server, "at-1", 3600).await;
    Mock::given(method("GET"))
        .and(path("/oauth/userinfo"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": "user-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    f.client.authorize("user-1", "code-1").await.unwrap();

    let profile = f.client.user_info("user-1").await.unwrap();
    assert_eq!(profile["sub"], "user-42");
}

//! Integration tests for protected advertising API calls

use super::*;
use ads_access::{CircuitBreakerConfig, CircuitState, ErrorKind};
use wiremock::matchers::header;

async fn authorized(server: &MockServer, builder: AccessConfigBuilder) -> Fixture {
    mount_code_grant(server, "at-1", 3600).await;
    let f = fixture(builder);
    f.client.authorize("user-1", "code-1").await.unwrap();
    f
}

async fn campaigns(f: &Fixture, server: &MockServer) -> AccessResult<serde_json::Value> {
    let url = format!("{}/v1/campaigns", server.uri());
    f.client
        .call("user-1", "ads-api", |credential| {
            api_get(url.clone(), credential.authorization_header())
        })
        .await
}

fn campaign_list() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"campaigns": [{"id": "c-1"}]}))
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(campaign_list())
        .expect(1)
        .mount(&server)
        .await;

    let f = authorized(&server, config_for(&server)).await;
    let body = campaigns(&f, &server).await.unwrap();

    assert_eq!(body["campaigns"][0]["id"], "c-1");
    assert_eq!(f.metrics.count("executor_attempt"), 3);
    assert_eq!(f.metrics.count("executor_retry_delay_ms"), 2);
    assert_eq!(
        f.client.executor().registry().state("ads-api"),
        CircuitState::Closed
    );
}

#[tokio::test]
async fn test_invalid_request_is_not_retried() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
        .expect(1)
        .mount(&server)
        .await;

    let f = authorized(&server, config_for(&server)).await;
    let error = campaigns(&f, &server).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::InvalidRequest);
    assert_eq!(f.metrics.count("executor_retry_delay_ms"), 0);
}

#[tokio::test]
async fn test_rate_limit_hint_is_capped() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(campaign_list())
        .mount(&server)
        .await;

    let f = authorized(&server, config_for(&server)).await;
    campaigns(&f, &server).await.unwrap();

    let delays = f.metrics.get_entries_by_name("executor_retry_delay_ms");
    assert_eq!(delays.len(), 1);
    assert!(delays[0].value <= 50.0);
}

#[tokio::test]
async fn test_breaker_opens_and_recovers() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(campaign_list())
        .mount(&server)
        .await;

    let breaker = CircuitBreakerConfig::new()
        .failure_threshold(3)
        .reset_timeout(Duration::from_secs(30));
    let f = authorized(&server, config_for(&server).circuit_breaker(breaker)).await;

    let error = campaigns(&f, &server).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RetriesExhausted);
    assert_eq!(
        f.client.executor().registry().state("ads-api"),
        CircuitState::Open
    );

    let error = campaigns(&f, &server).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::CircuitOpen);
    assert_eq!(f.metrics.count("circuit_rejection"), 1);

    let api_calls = |requests: Vec<wiremock::Request>| {
        requests
            .iter()
            .filter(|r| r.url.path() == "/v1/campaigns")
            .count()
    };
    assert_eq!(api_calls(server.received_requests().await.unwrap()), 3);

    f.clock.advance(Duration::from_secs(31));
    campaigns(&f, &server).await.unwrap();
    assert_eq!(
        f.client.executor().registry().state("ads-api"),
        CircuitState::Closed
    );
    assert_eq!(api_calls(server.received_requests().await.unwrap()), 4);
}

#[tokio::test]
async fn test_rejected_credential_is_refreshed_once() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(token_response("at-2", None, 3600))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .and(header("authorization", "Bearer at-2"))
        .respond_with(campaign_list())
        .expect(1)
        .mount(&server)
        .await;

    let f = authorized(&server, config_for(&server)).await;
    let body = campaigns(&f, &server).await.unwrap();

    assert_eq!(body["campaigns"][0]["id"], "c-1");
    assert_eq!(
        f.client.executor().registry().snapshot("ads-api").unwrap().failure_count,
        0
    );
}

#[tokio::test]
async fn test_second_rejection_is_surfaced() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(token_response("at-2", None, 3600))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let f = authorized(&server, config_for(&server)).await;
    let error = campaigns(&f, &server).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Unauthorized);
    assert_eq!(
        f.client.executor().registry().state("ads-api"),
        CircuitState::Closed
    );
}

#[tokio::test]
async fn test_unauthorized_principal_makes_no_call() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/campaigns"))
        .respond_with(campaign_list())
        .expect(0)
        .mount(&server)
        .await;

    let f = fixture(config_for(&server));
    let error = campaigns(&f, &server).await.unwrap_err();

    assert!(error.needs_interactive_auth());
}

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sa_token::auth::{
    FixedClock, HttpTokenExchanger, JwtAssertionBuilder, ServiceAccountCredential,
    ServiceAccountTokenSource, SignedAssertion, TokenExchange, DRIVE_SCOPE,
};
use sa_token::{AuthError, Stage};

const TEST_KEY: &str = include_str!("fixtures/test_key.pem");

fn credential_json() -> String {
    json!({
        "client_email": "a@b.iam.gserviceaccount.com",
        "private_key": TEST_KEY,
        "project_id": "p"
    })
    .to_string()
}

fn assertion() -> SignedAssertion {
    let credential = ServiceAccountCredential {
        client_email: "a@b.iam.gserviceaccount.com".to_string(),
        private_key_pem: TEST_KEY.to_string(),
        project_id: "p".to_string(),
    };
    JwtAssertionBuilder::new(Arc::new(FixedClock(1_700_000_000)))
        .build(&credential, DRIVE_SCOPE)
        .unwrap()
}

fn exchanger(server: &MockServer) -> HttpTokenExchanger {
    HttpTokenExchanger::new(format!("{}/token", server.uri()), Duration::from_secs(5))
}

/// `assertion` parameter of a recorded form body
fn assertion_param(body: &[u8]) -> String {
    let body = String::from_utf8(body.to_vec()).unwrap();
    body.split('&')
        .find_map(|pair| pair.strip_prefix("assertion="))
        .expect("assertion parameter present")
        .to_string()
}

#[tokio::test]
async fn test_successful_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = assert_ok!(exchanger(&server).exchange(&assertion()).await);
    assert_eq!(token.as_str(), "ya29.test-token");
    assert_eq!(token.expires_in(), Some(Duration::from_secs(3599)));
    assert_eq!(token.token_type(), "Bearer");
}

#[tokio::test]
async fn test_invalid_grant_is_exchange_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;

    let err = assert_err!(exchanger(&server).exchange(&assertion()).await);
    match &err {
        AuthError::OAuth2Exchange { status, .. } => assert_eq!(*status, Some(400)),
        other => panic!("expected OAuth2Exchange, got {:?}", other),
    }
    assert!(err.to_string().contains("invalid_grant"), "{}", err);
}

#[tokio::test]
async fn test_missing_access_token_is_response_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })),
        )
        .mount(&server)
        .await;

    let err = assert_err!(exchanger(&server).exchange(&assertion()).await);
    assert!(matches!(err, AuthError::OAuth2Response(_)), "{:?}", err);
}

#[tokio::test]
async fn test_non_json_success_body_is_response_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = assert_err!(exchanger(&server).exchange(&assertion()).await);
    assert!(matches!(err, AuthError::OAuth2Response(_)), "{:?}", err);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let exchanger =
        HttpTokenExchanger::new(format!("{}/token", server.uri()), Duration::from_millis(100));
    let err = assert_err!(exchanger.exchange(&assertion()).await);
    assert!(matches!(err, AuthError::OAuth2Timeout(_)), "{:?}", err);
    assert_eq!(err.stage(), Stage::ExchangingToken);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_exchange_error() {
    // Nothing listens on the discard port
    let exchanger = HttpTokenExchanger::new("http://127.0.0.1:9/token", Duration::from_secs(2));
    let err = assert_err!(exchanger.exchange(&assertion()).await);
    assert!(
        matches!(err, AuthError::OAuth2Exchange { status: None, .. }),
        "{:?}",
        err
    );
}

#[tokio::test]
async fn test_end_to_end_single_exchange_with_jwt_assertion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.e2e",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ServiceAccountTokenSource::new(credential_json())
        .with_exchanger(Arc::new(exchanger(&server)));

    let acquisition = source.acquire(DRIVE_SCOPE).await.unwrap();
    assert_eq!(acquisition.token.as_str(), "ya29.e2e");
    assert_eq!(acquisition.trace.attempt_count(), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let jwt_format = Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").unwrap();
    let assertion = assertion_param(&requests[0].body);
    assert!(jwt_format.is_match(&assertion), "bad assertion: {}", assertion);
}

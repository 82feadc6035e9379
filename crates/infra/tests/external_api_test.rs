//! Outbound client behavior against a mock HTTP server.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

use courier_core::{RetryPolicy, Settings};
use courier_infra::external_api::{
    ApiConfig, ApiErrorKind, ApiRegistry, ApiWrapper, Headers, RequestOptions,
};

fn config_for(server: &MockServer) -> ApiConfig {
    ApiConfig::new(server.address().to_string())
}

fn api(server: &MockServer) -> ApiWrapper {
    ApiWrapper::new("test", config_for(server)).unwrap()
}

fn headers(pairs: &[(&str, &str)]) -> Headers {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>()
}

#[tokio::test]
async fn get_sends_query_and_decodes_json() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/users"))
        .and(matchers::query_param("param", "get"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let body = api(&server)
        .get("/users", Some(&json!({"param": "get"})), None)
        .await
        .unwrap();

    assert_eq!(body, json!({"success": true}));
}

#[tokio::test]
async fn post_and_put_send_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/users"))
        .and(matchers::body_json(json!({"name": "ada"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("PUT"))
        .and(matchers::path("/users/1"))
        .and(matchers::body_json(json!({"name": "grace"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1, "updated": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    let created = api.post("/users", Some(&json!({"name": "ada"})), None).await.unwrap();
    let updated = api.put("/users/1", Some(&json!({"name": "grace"})), None).await.unwrap();

    assert_eq!(created, json!({"id": 1}));
    assert_eq!(updated["updated"], json!(true));
}

#[tokio::test]
async fn delete_with_empty_body_resolves_null() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("DELETE"))
        .and(matchers::path("/users/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let body = api(&server).delete("/users/1", None).await.unwrap();
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn text_bodies_come_back_as_strings() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let body = api(&server).get("/health", None, None).await.unwrap();
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn arbitrary_methods_go_through_request() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("OPTIONS"))
        .and(matchers::path("/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"allow": "GET, POST"})))
        .expect(1)
        .mount(&server)
        .await;

    let body = api(&server)
        .request("/users", RequestOptions::new(Method::OPTIONS))
        .await
        .unwrap();
    assert_eq!(body["allow"], "GET, POST");
}

#[tokio::test]
async fn matching_headers_are_accepted() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let body = api(&server)
        .get("/secure", None, Some(&headers(&[("x-api-key", "secret")])))
        .await
        .unwrap();
    assert_eq!(body, json!({"ok": 1}));
}

#[tokio::test]
async fn mismatched_headers_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server).with_retry(RetryPolicy::exponential(2, Duration::from_millis(1)));
    let api = ApiWrapper::new("test", config).unwrap();

    let err = api
        .get("/secure", None, Some(&headers(&[("x-api-key", "wrong")])))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Status);
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.attempts(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn client_errors_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid"))
        .mount(&server)
        .await;

    let err = api(&server)
        .post("/users", Some(&json!({})), None)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(422));
    assert_eq!(err.body(), Some("invalid"));
    assert_eq!(err.attempts(), 1);
    assert!(err.to_string().starts_with("POST http://"));
}

#[tokio::test]
async fn server_errors_retry_full_schedule() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(6)
        .mount(&server)
        .await;

    let config = config_for(&server).with_retry(RetryPolicy::exponential(5, Duration::from_millis(1)));
    let err = ApiWrapper::new("test", config)
        .unwrap()
        .get("/flaky", None, None)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(503));
    assert_eq!(err.attempts(), 6);
}

#[tokio::test]
async fn recovers_when_a_retry_succeeds() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"attempt": 3})))
        .mount(&server)
        .await;

    let config = config_for(&server).with_retry(RetryPolicy::fibonacci(5, Duration::from_millis(1)));
    let body = ApiWrapper::new("test", config)
        .unwrap()
        .get("/flaky", None, None)
        .await
        .unwrap();

    assert_eq!(body, json!({"attempt": 3}));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = config_for(&server)
        .with_timeout(Duration::from_millis(50))
        .with_retry(RetryPolicy::exponential(1, Duration::from_millis(5)));
    let err = ApiWrapper::new("test", config)
        .unwrap()
        .get("/delayed", None, None)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.kind(), ApiErrorKind::Timeout);
    assert_eq!(err.attempts(), 2);
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn https_against_plain_http_fails_in_transport() {
    let server = MockServer::start().await;
    Mock::given(matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server).with_protocol("https");
    let err = ApiWrapper::new("test", config)
        .unwrap()
        .get("/users", None, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Transport);
    assert_eq!(err.status_code(), None);
    assert!(err.transport_error().is_some());
}

#[tokio::test]
async fn invalid_json_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{oops", "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server).with_retry(RetryPolicy::exponential(3, Duration::from_millis(1)));
    let err = ApiWrapper::new("test", config)
        .unwrap()
        .get("/broken", None, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Decode);
}

#[tokio::test]
async fn registry_serves_configured_apis() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .mount(&server)
        .await;

    let settings = Settings::from_value(json!({
        "externalAPIs": {
            "orders": {"host": server.address().to_string(), "timeout": 1000}
        }
    }));
    let registry = ApiRegistry::load(&settings).unwrap();

    let orders = registry.get("orders").unwrap();
    assert_eq!(orders.timeout(), Some(Duration::from_secs(1)));
    assert_eq!(orders.get("/orders", None, None).await.unwrap(), json!([1, 2]));
}

//! Real-mode gateway behaviour against a simulated Engine

use std::time::Duration;

use lpfactory::console::state::{AppStore, StatePatch};
use lpfactory::console::sync::{JobQuery, Method, RequestOptions, API_KEY_HEADER};
use lpfactory::console::{Config, SyncClient};
use lpfactory::shared::{ApiErrorKind, ConnectivityMode};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::*;

#[tokio::test]
async fn test_mock_mode_never_reaches_network() {
    let server = MockServer::start().await;
    let store = AppStore::in_memory();
    store.set_endpoint_base_url(&server.uri());
    let client = SyncClient::new(store.clone(), &Config::new()).with_mock_latency(Duration::ZERO);
    assert!(store.get_state().is_mock());

    let first = assert_ok!(client.get("/clusters").await);
    let second = assert_ok!(client.get("/clusters").await);
    assert_eq!(first, second);
    assert_eq!(first.unwrap().as_array().map(Vec::len), Some(3));

    let error = assert_api_err!(client.get("/unknown/path").await, ApiErrorKind::MockRouteNotFound);
    assert!(error.message.contains("not found"));

    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_mock_post_echoes_job() {
    let store = AppStore::in_memory();
    let client = SyncClient::new(store, &Config::new()).with_mock_latency(Duration::ZERO);
    let body = json!({ "type": "create_cluster", "project_id": "p1" });

    let data = assert_ok!(client.post("/jobs", Some(body.clone())).await);
    assert_eq!(data, Some(body));
}

#[tokio::test]
async fn test_success_marks_reachable() {
    let (server, store, client) = engine().await;
    store.set_reachable(false);
    Mock::given(method("GET"))
        .and(path("/clusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "c1" }])))
        .mount(&server)
        .await;

    let data = assert_ok!(client.get("/clusters").await);
    assert_eq!(data, Some(json!([{ "id": "c1" }])));
    assert!(store.is_reachable());
}

#[tokio::test]
async fn test_server_error_keeps_reachability() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/clusters"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(store.is_reachable());
    let error = assert_api_err!(client.get("/clusters").await, ApiErrorKind::Http { status: 500 });
    assert_eq!(error.message, "HTTP 500: Internal Server Error");
    assert!(store.is_reachable());

    // Nor does an error flip it back once it is false
    store.set_reachable(false);
    assert_api_err!(client.get("/clusters").await, ApiErrorKind::Http { .. });
    assert!(!store.is_reachable());
}

#[tokio::test]
async fn test_network_failure_marks_unreachable() {
    let url = refused_url();
    let (store, _) = real_store(&url);
    let client = real_client(&store, &url);
    assert!(store.is_reachable());

    let error = assert_api_err!(client.get("/clusters").await, ApiErrorKind::Network);
    assert!(!error.message.is_empty());
    assert!(!store.get_state().is_reachable);
}

#[tokio::test]
async fn test_no_content_is_empty_success() {
    let (server, _store, client) = engine().await;
    Mock::given(method("POST"))
        .and(path("/jobs/job-1/cancel"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert_eq!(assert_ok!(client.cancel_job("job-1").await), None);
}

#[tokio::test]
async fn test_not_found_uses_detail() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/jobs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Not Found" })))
        .mount(&server)
        .await;

    let error = assert_api_err!(client.get("/jobs/missing").await, ApiErrorKind::Http { status: 404 });
    assert_eq!(error.message, "Not Found");
    assert_eq!(error.code, None);
    assert!(store.is_reachable());
}

#[tokio::test]
async fn test_auth_failure_message() {
    let (server, _store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let error = assert_api_err!(client.whoami().await, ApiErrorKind::Http { status: 401 });
    assert!(error.message.contains("API key"), "{}", error.message);
}

#[tokio::test]
async fn test_credential_header_sent() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .and(header(API_KEY_HEADER, TEST_API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "ops" })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = assert_ok!(client.whoami().await);
    assert_eq!(identity.name, "ops");

    // An emptied credential is no longer sent
    store.set_credential_token("");
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests[0].headers.get(API_KEY_HEADER).is_some());
    let _ = client.whoami().await;
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests[1].headers.get(API_KEY_HEADER).is_none());
}

#[tokio::test]
async fn test_engine_envelope_passthrough() {
    let (server, _store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{ "id": "tpl-1", "name": "Legal" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": { "message": "Quota exceeded", "code": "QUOTA" }
        })))
        .mount(&server)
        .await;

    let templates = assert_ok!(client.list_templates().await);
    assert_eq!(templates[0].name, "Legal");

    let error = assert_api_err!(
        client.post("/jobs", Some(json!({ "type": "x" }))).await,
        ApiErrorKind::Engine
    );
    assert_eq!(error.message, "Quota exceeded");
    assert_eq!(error.code.as_deref(), Some("QUOTA"));
}

#[tokio::test]
async fn test_text_body_passthrough() {
    let (server, _store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    assert_eq!(assert_ok!(client.health().await), Some(json!("pong")));
}

#[tokio::test]
async fn test_timeout_keeps_reachability() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/clusters"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let error = assert_api_err!(client.get("/clusters").await, ApiErrorKind::Timeout);
    assert_eq!(error.message, "Timeout");
    assert!(store.is_reachable());
}

#[tokio::test]
async fn test_per_call_timeout_override() {
    let (server, _store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/audit"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let options = RequestOptions::new().timeout(Duration::from_secs(5));
    let data = assert_ok!(client.request(Method::Get, "/audit", None, options).await);
    assert_eq!(data, Some(json!([])));
}

#[tokio::test]
async fn test_cancelled_request_leaves_store_alone() {
    let url = refused_url();
    let (store, storage) = real_store(&url);
    let client = real_client(&store, &url);
    let writes = storage.writes();

    let token = CancellationToken::new();
    token.cancel();
    let options = RequestOptions::new().cancel(token);
    assert_api_err!(
        client.request(Method::Get, "/clusters", None, options).await,
        ApiErrorKind::Cancelled
    );
    assert!(store.is_reachable());
    assert_eq!(storage.writes(), writes);
}

#[tokio::test]
async fn test_query_assembly_on_the_wire() {
    let (server, _store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(query_param("limit", "20"))
        .and(query_param("status", "running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "j1", "type": "publish", "status": "running" }],
            "total": 1
        })))
        .mount(&server)
        .await;

    let jobs = assert_ok!(
        client
            .list_jobs(&JobQuery {
                project_id: Some("all".to_string()),
                status: Some("running".to_string()),
                limit: Some(20),
                offset: None,
            })
            .await
    );
    assert_eq!(jobs.len(), 1);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests[0].url.query(), Some("status=running&limit=20"));
}

#[tokio::test]
async fn test_create_suggestion_posts_body() {
    let (server, _store, client) = engine().await;
    Mock::given(method("POST"))
        .and(path("/agents/agent-copy/suggestions"))
        .and(body_json(json!({ "title": "t", "body": "b" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "sg-9" })))
        .expect(1)
        .mount(&server)
        .await;

    let created = assert_ok!(
        client
            .create_agent_suggestion(
                "agent-copy",
                &lpfactory::shared::models::NewAgentSuggestion {
                    title: "t".to_string(),
                    body: "b".to_string(),
                },
            )
            .await
    );
    assert_eq!(created, json!({ "id": "sg-9" }));
}

#[tokio::test]
async fn test_health_check_updates_store() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "degraded" })))
        .mount(&server)
        .await;

    assert!(!store.check_health(&client).await);
    assert!(!store.is_reachable());

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;
    assert!(store.check_health(&client).await);
    assert!(store.is_reachable());
}

#[tokio::test]
async fn test_mode_switch_applies_to_next_request() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/clusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let client = client.with_mock_latency(Duration::ZERO);

    assert_eq!(assert_ok!(client.get("/clusters").await), Some(json!([])));
    store.set_state(StatePatch::new().connectivity_mode(ConnectivityMode::Mock));
    let mocked = assert_ok!(client.get("/clusters").await);
    assert_eq!(mocked.and_then(|v| v.as_array().map(Vec::len)), Some(3));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_stream_failure_keeps_reachability() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-1/stream"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let error = match client.stream_job_logs("job-1", None).await {
        Ok(_) => panic!("stream should not open"),
        Err(e) => e,
    };
    assert_eq!(error.kind, ApiErrorKind::StreamUnavailable);
    assert!(store.is_reachable());

    let url = refused_url();
    store.set_endpoint_base_url(&url);
    let error = match client.stream_job_logs("job-1", None).await {
        Ok(_) => panic!("stream should not open"),
        Err(e) => e,
    };
    assert_eq!(error.kind, ApiErrorKind::StreamUnavailable);
    assert!(store.is_reachable());
}

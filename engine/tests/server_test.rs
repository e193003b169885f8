//! End-to-end tests of the HTTP surface
//!
//! Boots the real router over an ephemeral port, with a wiremock control
//! plane and an in-process WebSocket backend behind it.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchboard_engine::config::{Credentials, DomainConfig, RealtimeConfig, SearchConfig};
use switchboard_engine::enrichment::domain::DomainService;
use switchboard_engine::enrichment::search::SearchService;
use switchboard_engine::memory::ConversationStore;
use switchboard_engine::orchestrator::CallOrchestrator;
use switchboard_engine::realtime::transport::TransportRegistry;
use switchboard_engine::realtime::RealtimeClient;
use switchboard_engine::server::{router, AppState};

async fn spawn_ws_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ws backend");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    format!("ws://{}/realtime", addr)
}

fn empty_credentials() -> Credentials {
    Credentials {
        realtime_api_key: "test-key".to_string(),
        webhook_secret: None,
        search_api_key: None,
        search_engine_id: None,
        registrar_api_key: None,
        registrar_api_secret: None,
        whois_api_key: None,
    }
}

/// Boot the full HTTP surface; returns its base URL
async fn spawn_app(control_uri: &str, ws_url: &str, webhook_secret: Option<&str>) -> String {
    let config = RealtimeConfig {
        base_url: control_uri.to_string(),
        ws_url: ws_url.to_string(),
        request_timeout_secs: 5,
        ..RealtimeConfig::default()
    };

    let (events_tx, events_rx) = mpsc::channel(64);
    CallOrchestrator::spawn_event_router(events_rx);

    let store = ConversationStore::new(Duration::from_secs(3600));
    let transports = Arc::new(TransportRegistry::new(
        config.ws_url.as_str(),
        "test-key",
        events_tx,
    ));
    let client = Arc::new(RealtimeClient::new(&config, "test-key"));
    let orchestrator = Arc::new(CallOrchestrator::new(
        store.clone(),
        Arc::clone(&transports),
        Arc::clone(&client),
        config,
    ));

    let credentials = empty_credentials();
    let state = AppState {
        orchestrator,
        store,
        transports,
        search: Arc::new(SearchService::from_config(
            &SearchConfig::default(),
            &credentials,
        )),
        domain: Arc::new(DomainService::from_config(
            &DomainConfig::default(),
            &credentials,
        )),
        webhook_secret: webhook_secret.map(String::from),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind app");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("serve");
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_endpoint() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;
    let base = spawn_app(&control.uri(), &ws_url, None).await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("request")
        .json()
        .await
        .expect("json");

    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "switchboard");
}

#[tokio::test]
async fn test_webhook_incoming_call_returns_directive() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;

    Mock::given(method("POST"))
        .and(path("/calls/c1/accept"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&control)
        .await;

    let base = spawn_app(&control.uri(), &ws_url, None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/webhook", base))
        .json(&json!({"type": "call.incoming", "data": {"call_id": "c1"}}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["control"]["action"], "accept");
    assert_eq!(
        body["control"]["parameters"]["turn_detection"]["type"],
        "semantic_vad"
    );
}

#[tokio::test]
async fn test_webhook_other_events_acknowledged() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;
    let base = spawn_app(&control.uri(), &ws_url, None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/webhook", base))
        .json(&json!({"type": "call.ended", "data": {"call_id": "c1"}}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.expect("body"), "pong");
}

#[tokio::test]
async fn test_webhook_rejects_bad_secret() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;
    let base = spawn_app(&control.uri(), &ws_url, Some("s3cret")).await;
    let client = reqwest::Client::new();

    // Missing header
    let response = client
        .post(format!("{}/webhook", base))
        .json(&json!({"type": "call.incoming", "data": {"call_id": "c1"}}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 401);

    // Wrong header
    let response = client
        .post(format!("{}/webhook", base))
        .header("x-webhook-secret", "nope")
        .json(&json!({"type": "call.incoming", "data": {"call_id": "c1"}}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_webhook_rejects_malformed_event() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;
    let base = spawn_app(&control.uri(), &ws_url, None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/webhook", base))
        .body("this is not json")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{}/webhook", base))
        .json(&json!({"type": "call.incoming"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_webhook_accept_failure_maps_to_bad_gateway() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;

    Mock::given(method("POST"))
        .and(path("/calls/c1/accept"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&control)
        .await;

    let base = spawn_app(&control.uri(), &ws_url, None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/webhook", base))
        .json(&json!({"type": "call.incoming", "data": {"call_id": "c1"}}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_conversation_endpoints() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;
    let base = spawn_app(&control.uri(), &ws_url, None).await;
    let client = reqwest::Client::new();

    // Unknown conversation → 404
    let response = client
        .get(format!("{}/conversation/c1", base))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 404);

    // Record two turns
    for (role, content) in [("caller", "hi"), ("agent", "hello")] {
        let response = client
            .post(format!("{}/conversation/c1/message", base))
            .json(&json!({"role": role, "content": content}))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), 200);
    }

    // Summary renders the caller-facing labels
    let body: serde_json::Value = client
        .get(format!("{}/conversation/c1/summary", base))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["summary"], "Caller: hi\nAgent: hello");

    // Context update then full fetch
    let response = client
        .post(format!("{}/conversation/c1/context", base))
        .json(&json!({"caller_name": "Ada"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = client
        .get(format!("{}/conversation/c1", base))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["memory"]["context"]["caller_name"], "Ada");
    assert_eq!(body["memory"]["turns"].as_array().expect("turns").len(), 2);

    // Delete, then it's gone
    let response = client
        .delete(format!("{}/conversation/c1", base))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/conversation/c1", base))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_voice_endpoints() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;
    let base = spawn_app(&control.uri(), &ws_url, None).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .post(format!("{}/voice/analyze", base))
        .json(&json!({
            "transcription": "this is terrible, there is a problem with my bill",
            "audio": {"duration": 3.0, "sample_rate": 16000, "bit_depth": 16}
        }))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");

    assert_eq!(body["analysis"]["sentiment"], "negative");
    assert_eq!(body["analysis"]["intent"], "complaint");
    assert_eq!(body["analysis"]["language"], "English");
    assert!(body["report"]["overall_score"].as_u64().expect("score") <= 100);

    let body: serde_json::Value = client
        .get(format!("{}/voice/quality", base))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["parameters"]["sample_rate"], 16000);
}

#[tokio::test]
async fn test_status_endpoint() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;
    let base = spawn_app(&control.uri(), &ws_url, None).await;

    let body: serde_json::Value = reqwest::get(format!("{}/status", base))
        .await
        .expect("request")
        .json()
        .await
        .expect("json");

    assert_eq!(body["status"], "operational");
    assert_eq!(body["active_conversations"], 0);
    assert_eq!(body["search"]["configured"], false);
    assert_eq!(body["domain"]["configured"], false);
}

#[tokio::test]
async fn test_terminate_endpoint() {
    let control = MockServer::start().await;
    let ws_url = spawn_ws_backend().await;

    Mock::given(method("POST"))
        .and(path("/calls/c1/accept"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&control)
        .await;
    Mock::given(method("POST"))
        .and(path("/calls/c1/hangup"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&control)
        .await;

    let base = spawn_app(&control.uri(), &ws_url, None).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/webhook", base))
        .json(&json!({"type": "call.incoming", "data": {"call_id": "c1"}}))
        .send()
        .await
        .expect("accept");

    let body: serde_json::Value = client
        .post(format!("{}/calls/c1/terminate", base))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");

    assert_eq!(body["ok"], true);

    // Conversation is gone after termination
    let response = client
        .get(format!("{}/conversation/c1", base))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 404);
}

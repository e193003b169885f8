//! HTTP surface
//!
//! Thin axum layer over the core: the telephony webhook, call control,
//! enrichment endpoints, and conversation inspection. Payload validation
//! and the shared-secret webhook check live here, at the boundary — the
//! orchestrator never sees a malformed event.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::enrichment::domain::DomainService;
use crate::enrichment::search::SearchService;
use crate::enrichment::voice;
use crate::memory::{ConversationStore, TurnRole};
use crate::orchestrator::CallOrchestrator;
use crate::realtime::transport::TransportRegistry;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CallOrchestrator>,
    pub store: ConversationStore,
    pub transports: Arc<TransportRegistry>,
    pub search: Arc<SearchService>,
    pub domain: Arc<DomainService>,
    pub webhook_secret: Option<String>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/calls/:call_id/terminate", post(terminate_call))
        .route("/search/:query", get(search_get))
        .route("/search", post(search_post))
        .route("/search/cache", delete(clear_search_cache))
        .route("/domain/check/:domain", get(domain_check))
        .route("/domain/suggest/:keyword", get(domain_suggest))
        .route("/voice/analyze", post(voice_analyze))
        .route("/voice/quality", get(voice_quality))
        .route(
            "/conversation/:call_id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/conversation/:call_id/summary", get(conversation_summary))
        .route("/conversation/:call_id/message", post(add_message))
        .route("/conversation/:call_id/context", post(update_context))
        .route("/status", get(status))
        .with_state(state)
}

/// Bind and serve until SIGINT or SIGTERM
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received, stopping server...");
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,

    #[serde(default)]
    data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    call_id: Option<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "switchboard",
    }))
}

/// Telephony webhook: dispatches incoming-call events to the orchestrator,
/// acknowledges everything else neutrally.
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers
            .get("x-webhook-secret")
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("Webhook rejected: bad or missing shared secret");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid webhook secret"})),
            )
                .into_response();
        }
    }

    let event: WebhookEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("Malformed event: {}", e)})),
            )
                .into_response();
        }
    };

    if event.event_type != "call.incoming" {
        return (StatusCode::OK, "pong").into_response();
    }

    let call_id = match event.data.call_id {
        Some(id) => id,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing call_id"})),
            )
                .into_response();
        }
    };

    info!("Incoming call {}", call_id);
    match state.orchestrator.handle_incoming_call(&call_id).await {
        Ok(directive) => Json(directive).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn terminate_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Response {
    let outcome = state.orchestrator.terminate(&call_id).await;
    Json(outcome).into_response()
}

async fn search_get(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Json<serde_json::Value> {
    let results = state.search.search(&query, None).await;
    Json(json!({
        "query": query,
        "results_count": results.len(),
        "results": results,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    max_results: Option<usize>,
}

async fn search_post(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Json<serde_json::Value> {
    let results = state.search.search(&request.query, request.max_results).await;
    Json(json!({
        "query": request.query,
        "results_count": results.len(),
        "results": results,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn clear_search_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.search.clear_cache();
    Json(json!({"cleared": true}))
}

async fn domain_check(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Json<serde_json::Value> {
    let info = state.domain.check(&domain).await;
    let mut body = serde_json::to_value(&info).unwrap_or_else(|_| json!({}));
    body["timestamp"] = json!(Utc::now().to_rfc3339());
    Json(body)
}

async fn domain_suggest(
    State(state): State<AppState>,
    Path(keyword): Path<String>,
) -> Json<serde_json::Value> {
    let suggestions = state.domain.suggestions(&keyword).await;
    Json(json!({
        "keyword": keyword,
        "count": suggestions.len(),
        "suggestions": suggestions,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct VoiceAnalyzeRequest {
    transcription: String,
    audio: Option<voice::AudioProbe>,
}

async fn voice_analyze(Json(request): Json<VoiceAnalyzeRequest>) -> Json<serde_json::Value> {
    let metrics = request.audio.as_ref().map(voice::analyze_metrics);
    let analysis = voice::analyze(&request.transcription, metrics);
    let report = voice::quality_report(&analysis);
    Json(json!({
        "analysis": analysis,
        "report": report,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn voice_quality() -> Json<serde_json::Value> {
    Json(json!({
        "parameters": voice::recommended_capture(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Response {
    match state.store.get(&call_id).await {
        Some(memory) => {
            let summary = state.store.summarize(&call_id).await;
            Json(json!({
                "call_id": call_id,
                "summary": summary,
                "memory": memory,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .into_response()
        }
        None => conversation_not_found(&call_id),
    }
}

async fn conversation_summary(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Response {
    if state.store.get(&call_id).await.is_none() {
        return conversation_not_found(&call_id);
    }

    let summary = state.store.summarize(&call_id).await;
    Json(json!({
        "call_id": call_id,
        "summary": summary,
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct AddMessageRequest {
    role: TurnRole,
    content: String,
}

async fn add_message(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(request): Json<AddMessageRequest>,
) -> Json<serde_json::Value> {
    state
        .store
        .add_turn(&call_id, request.role, request.content)
        .await;
    Json(json!({
        "call_id": call_id,
        "message_added": true,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn update_context(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(partial): Json<std::collections::HashMap<String, serde_json::Value>>,
) -> Json<serde_json::Value> {
    state.store.update_context(&call_id, partial).await;
    Json(json!({
        "call_id": call_id,
        "context_updated": true,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Json<serde_json::Value> {
    state.store.clear(&call_id).await;
    Json(json!({
        "call_id": call_id,
        "deleted": true,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (conversation_count, _) = state.store.stats().await;
    let (cache_entries, _) = state.search.cache_stats();

    Json(json!({
        "status": "operational",
        "active_conversations": conversation_count,
        "active_transports": state.transports.snapshot().await,
        "search": {
            "configured": state.search.is_configured(),
            "cache_entries": cache_entries,
        },
        "domain": {
            "configured": state.domain.is_configured(),
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn conversation_not_found(call_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("No conversation found for call ID: {}", call_id)
        })),
    )
        .into_response()
}

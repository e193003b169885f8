//! Command handlers
//!
//! Implements the CLI commands: wiring the component graph for `serve` and
//! the readiness report for `check`.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{Config, Credentials};
use crate::enrichment::domain::DomainService;
use crate::enrichment::search::SearchService;
use crate::memory::ConversationStore;
use crate::orchestrator::CallOrchestrator;
use crate::realtime::transport::TransportRegistry;
use crate::realtime::RealtimeClient;
use crate::server::{self, AppState};

/// Buffer size for the session event channel
const EVENT_CHANNEL_SIZE: usize = 256;

/// Build the component graph and run the HTTP server until shutdown
pub async fn handle_serve(config: Config) -> Result<()> {
    let credentials = Credentials::from_env().context("Failed to resolve credentials")?;

    if credentials.webhook_secret.is_none() {
        warn!("SWITCHBOARD_WEBHOOK_SECRET is not set; webhook signature checks are disabled");
    }

    let store = ConversationStore::new(Duration::from_secs(config.memory.ttl_secs));
    let _sweeper = store.spawn_sweeper(Duration::from_secs(config.memory.sweep_interval_secs));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let transports = Arc::new(TransportRegistry::new(
        config.realtime.ws_url.as_str(),
        credentials.realtime_api_key.as_str(),
        events_tx,
    ));
    let client = Arc::new(RealtimeClient::new(
        &config.realtime,
        credentials.realtime_api_key.as_str(),
    ));
    let orchestrator = Arc::new(CallOrchestrator::new(
        store.clone(),
        Arc::clone(&transports),
        Arc::clone(&client),
        config.realtime.clone(),
    ));
    let _event_router = CallOrchestrator::spawn_event_router(events_rx);

    let search = Arc::new(SearchService::from_config(&config.search, &credentials));
    let domain = Arc::new(DomainService::from_config(&config.domain, &credentials));

    let state = AppState {
        orchestrator,
        store,
        transports,
        search,
        domain,
        webhook_secret: credentials.webhook_secret.clone(),
    };

    server::serve(&config.bind_addr(), state).await
}

/// Validate configuration and report credential readiness.
///
/// Exits non-zero when the service could not start (missing realtime
/// credential); degraded adapters are reported but are not failures.
pub fn handle_check(config: &Config) -> Result<()> {
    let mut checks: Vec<(&str, String)> = vec![("Configuration", "valid".to_string())];
    let mut fatal = None;

    match Credentials::from_env() {
        Ok(credentials) => {
            checks.push(("Realtime credential", "present".to_string()));

            checks.push((
                "Webhook secret",
                if credentials.webhook_secret.is_some() {
                    "configured".to_string()
                } else {
                    "disabled (requests are unauthenticated)".to_string()
                },
            ));

            let search_ready = match config.search.provider.as_str() {
                "google" => {
                    credentials.search_api_key.is_some() && credentials.search_engine_id.is_some()
                }
                "serpapi" => credentials.search_api_key.is_some(),
                _ => false,
            };
            checks.push((
                "Search adapter",
                if search_ready {
                    format!("ready ({})", config.search.provider)
                } else {
                    "degraded (empty results)".to_string()
                },
            ));

            let domain_ready = (credentials.registrar_api_key.is_some()
                && credentials.registrar_api_secret.is_some())
                || credentials.whois_api_key.is_some();
            checks.push((
                "Domain adapter",
                if domain_ready {
                    "ready".to_string()
                } else {
                    "degraded (fails closed)".to_string()
                },
            ));
        }
        Err(e) => {
            checks.push(("Realtime credential", "missing".to_string()));
            fatal = Some(e);
        }
    }

    checks.push(("Voice adapter", "ready (local analysis)".to_string()));
    checks.push(("Listen address", config.bind_addr()));

    println!("Switchboard readiness:");
    for (name, status) in &checks {
        println!("  {:<22} {}", name, status);
    }

    if let Some(e) = fatal {
        anyhow::bail!("{}", e);
    }
    Ok(())
}

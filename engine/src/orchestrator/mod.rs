//! Call Session Orchestrator
//!
//! The top-level coordinator for call lifecycles. An incoming-call event
//! becomes: conversation memory initialization, instruction composition,
//! a remote accept, and an asynchronously established session transport.
//! Termination is the sign-off path: summarize, clear memory, close the
//! transport, hang up remotely — local cleanup never depends on the remote
//! call succeeding.
//!
//! All collaborators are injected, lifecycle-scoped stores; the orchestrator
//! holds no state of its own beyond configuration.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RealtimeConfig;
use crate::memory::{ConversationMemory, ConversationStore};
use crate::realtime::transport::{SessionEvent, TransportRegistry};
use crate::realtime::{AcceptRequest, RealtimeClient, Result as RealtimeResult};

/// Fixed capability preamble appended to every session's instructions
const CAPABILITY_PREAMBLE: &str = "You have access to live capabilities during this call: \
internet search for current information, domain name availability checks, and awareness of \
the caller's tone and audio quality. Offer them when relevant instead of guessing.";

/// Directive returned to the caller-facing layer for an accepted call
#[derive(Debug, Clone, Serialize)]
pub struct ControlDirective {
    pub control: Control,
}

#[derive(Debug, Clone, Serialize)]
pub struct Control {
    pub action: String,
    pub parameters: DirectiveParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectiveParameters {
    pub voice: String,
    pub instructions: String,
    pub turn_detection: TurnDetectionPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDetectionPolicy {
    #[serde(rename = "type")]
    pub detection_type: String,
}

/// Outcome of terminating a call
///
/// `ok: false` only reports a remote hangup failure; local state has been
/// reclaimed either way, and the summary is whatever memory held at the
/// moment of termination.
#[derive(Debug, Clone, Serialize)]
pub struct TerminateOutcome {
    pub ok: bool,
    pub summary: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Coordinates memory, transport, and the realtime control plane per call
pub struct CallOrchestrator {
    store: ConversationStore,
    transports: Arc<TransportRegistry>,
    client: Arc<RealtimeClient>,
    realtime: RealtimeConfig,
}

impl CallOrchestrator {
    pub fn new(
        store: ConversationStore,
        transports: Arc<TransportRegistry>,
        client: Arc<RealtimeClient>,
        realtime: RealtimeConfig,
    ) -> Self {
        Self {
            store,
            transports,
            client,
            realtime,
        }
    }

    /// Turn an incoming-call event into an accepted session.
    ///
    /// Tolerates webhook redelivery: while a transport for the call is
    /// already connecting or open, the directive is rebuilt from current
    /// memory and returned without a second accept or connect. Instructions
    /// are recomputed on every invocation so context updates between
    /// deliveries are reflected.
    ///
    /// An accept failure propagates — no directive is returned for a call
    /// that was never answered.
    pub async fn handle_incoming_call(&self, call_id: &str) -> RealtimeResult<ControlDirective> {
        let already_active = self.transports.is_active(call_id).await;

        let initial_context = HashMap::from([
            ("started_at".to_string(), json!(Utc::now().to_rfc3339())),
            (
                "capabilities".to_string(),
                json!(["search", "domain_check", "voice_analysis"]),
            ),
        ]);
        let memory = self.store.get_or_create(call_id, initial_context).await;
        let instructions = self.compose_instructions(&memory);

        if already_active {
            info!(
                "Duplicate delivery for active call {}, returning directive without re-accept",
                call_id
            );
            return Ok(self.directive(instructions));
        }

        self.client
            .accept_call(
                call_id,
                &AcceptRequest::from_config(&self.realtime, instructions.as_str()),
            )
            .await?;
        info!("Accepted incoming call {}", call_id);

        // Session setup is decoupled from the webhook response path. A
        // connect failure is logged here; the registry has already dropped
        // the handle by the time the error surfaces.
        let transports = Arc::clone(&self.transports);
        let id = call_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = transports.connect(&id).await {
                warn!("Session connect failed for call {}: {}", id, e);
            }
        });

        Ok(self.directive(instructions))
    }

    /// Sign off a call: summarize, clear memory, close the transport, then
    /// hang up remotely. Works the same for unknown call ids (empty
    /// summary, no-op close) — termination is never an error locally.
    pub async fn terminate(&self, call_id: &str) -> TerminateOutcome {
        let summary = self.store.summarize(call_id).await;
        self.store.clear(call_id).await;
        self.transports.close(call_id).await;

        match self.client.hang_up(call_id).await {
            Ok(()) => {
                info!("Terminated call {}", call_id);
                TerminateOutcome {
                    ok: true,
                    summary,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Remote hangup failed for call {}: {}", call_id, e);
                TerminateOutcome {
                    ok: false,
                    summary,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Compose session instructions: base template, capability preamble,
    /// then one line per context key (sorted for stable output).
    fn compose_instructions(&self, memory: &ConversationMemory) -> String {
        let mut instructions = format!(
            "{}\n\n{}",
            self.realtime.instructions, CAPABILITY_PREAMBLE
        );

        if !memory.context.is_empty() {
            instructions.push_str("\n\nCurrent context:");
            let mut keys: Vec<_> = memory.context.keys().collect();
            keys.sort();
            for key in keys {
                let rendered = match &memory.context[key] {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                instructions.push_str(&format!("\n- {}: {}", key, rendered));
            }
        }

        instructions
    }

    fn directive(&self, instructions: String) -> ControlDirective {
        ControlDirective {
            control: Control {
                action: "accept".to_string(),
                parameters: DirectiveParameters {
                    voice: self.realtime.voice.clone(),
                    instructions,
                    turn_detection: TurnDetectionPolicy {
                        detection_type: self.realtime.turn_detection.clone(),
                    },
                },
            },
        }
    }

    /// Consume inbound session events. Routing beyond logging is a later
    /// concern; the tagged shape is what matters at this layer.
    pub fn spawn_event_router(
        mut events: mpsc::Receiver<SessionEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Control {
                        call_id,
                        event_type,
                        ..
                    } => {
                        debug!("Session event for call {}: {}", call_id, event_type);
                    }
                    SessionEvent::Unknown { call_id, .. } => {
                        debug!("Untyped session frame for call {}", call_id);
                    }
                    SessionEvent::Closed { call_id } => {
                        info!("Session ended for call {}", call_id);
                    }
                }
            }
        })
    }
}

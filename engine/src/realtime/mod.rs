//! Realtime backend integration
//!
//! The control plane for call sessions: accepting an incoming call and
//! hanging it up are REST calls against the realtime backend, authenticated
//! with a bearer credential. The per-call session socket lives in
//! [`transport`].
//!
//! Accept and hangup are at-least-once, non-idempotent network calls;
//! failures map onto [`RealtimeError`] and surface to the caller rather
//! than being swallowed.

pub mod transport;

use serde::Serialize;
use std::time::Duration;

use crate::config::RealtimeConfig;

/// Result type for realtime operations
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur while talking to the realtime backend
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Session handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Body of the accept-call control request
#[derive(Debug, Clone, Serialize)]
pub struct AcceptRequest {
    #[serde(rename = "type")]
    pub session_type: String,

    pub model: String,

    pub output_modalities: Vec<String>,

    pub audio: AudioSettings,

    pub instructions: String,
}

/// Audio negotiation for the session
#[derive(Debug, Clone, Serialize)]
pub struct AudioSettings {
    pub input: AudioInput,
    pub output: AudioOutput,
}

/// Caller-side audio parameters
#[derive(Debug, Clone, Serialize)]
pub struct AudioInput {
    pub format: String,
    pub turn_detection: TurnDetection,
}

/// Turn detection policy sent to the backend
#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,

    pub create_response: bool,
}

/// Backend-side audio parameters
#[derive(Debug, Clone, Serialize)]
pub struct AudioOutput {
    pub format: String,
    pub voice: String,
    pub speed: f64,
}

impl AcceptRequest {
    /// Build an accept request from config, with per-call instructions
    pub fn from_config(config: &RealtimeConfig, instructions: impl Into<String>) -> Self {
        Self {
            session_type: "realtime".to_string(),
            model: config.model.clone(),
            output_modalities: vec!["audio".to_string()],
            audio: AudioSettings {
                input: AudioInput {
                    format: config.input_format.clone(),
                    turn_detection: TurnDetection {
                        detection_type: config.turn_detection.clone(),
                        create_response: true,
                    },
                },
                output: AudioOutput {
                    format: config.output_format.clone(),
                    voice: config.voice.clone(),
                    speed: config.speed,
                },
            },
            instructions: instructions.into(),
        }
    }
}

/// HTTP client for the realtime control plane
pub struct RealtimeClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RealtimeClient {
    /// Create a client with the configured request timeout.
    ///
    /// A hung control call is bounded by this timeout and reported as a
    /// network error, never left pending.
    pub fn new(config: &RealtimeConfig, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            // Builder failure means the TLS backend is unusable; fall back
            // to the default client rather than refusing to start.
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Accept an incoming call, attaching session parameters and
    /// instructions. A failure here means the call was never answered.
    pub async fn accept_call(&self, call_id: &str, request: &AcceptRequest) -> Result<()> {
        let url = format!("{}/calls/{}/accept", self.base_url, call_id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| RealtimeError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, text));
        }

        Ok(())
    }

    /// Hang up a call. Empty body; the backend tears down the session.
    pub async fn hang_up(&self, call_id: &str) -> Result<()> {
        let url = format!("{}/calls/{}/hangup", self.base_url, call_id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| RealtimeError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, text));
        }

        Ok(())
    }
}

/// Map an HTTP error status onto the realtime error taxonomy
fn map_status(status: reqwest::StatusCode, text: String) -> RealtimeError {
    match status.as_u16() {
        401 | 403 => RealtimeError::AuthenticationFailed(text),
        429 => RealtimeError::RateLimitExceeded,
        _ => RealtimeError::InvalidRequest(format!("{}: {}", status, text)),
    }
}

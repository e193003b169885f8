//! Conversation Memory Store
//!
//! Keeps per-call conversation state (ordered turns plus a free-form context
//! map) for the lifetime of a call. Entries are created on first reference,
//! removed explicitly on termination, and evicted by a background sweep once
//! they have been idle longer than the configured TTL.
//!
//! No operation here returns an error: absence is an explicit `None` or
//! empty result. The store is the only owner of conversation state; callers
//! get snapshots, never references into the map.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The human caller
    Caller,
    /// The AI agent
    Agent,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::Caller => write!(f, "Caller"),
            TurnRole::Agent => write!(f, "Agent"),
        }
    }
}

/// A single utterance in a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke
    pub role: TurnRole,

    /// What was said
    pub content: String,

    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

/// Conversation state for one call
///
/// Turns are append-only and keep insertion order. Context is a shallow
/// key-value map with last-write-wins semantics per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMemory {
    /// The call this conversation belongs to
    pub call_id: String,

    /// Ordered conversation turns
    pub turns: Vec<ConversationTurn>,

    /// Free-form context attached to the call
    pub context: HashMap<String, serde_json::Value>,

    /// When the conversation started
    pub started_at: DateTime<Utc>,

    /// Last write of any kind (turn or context)
    pub last_updated_at: DateTime<Utc>,
}

impl ConversationMemory {
    fn new(call_id: impl Into<String>, context: HashMap<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            turns: Vec::new(),
            context,
            started_at: now,
            last_updated_at: now,
        }
    }
}

/// Store of active conversations, keyed by call id
///
/// Cloning is cheap; all clones share the same underlying map. The lock is
/// held only for short, non-awaiting critical sections, so operations on
/// different calls never serialize behind each other for long.
#[derive(Clone)]
pub struct ConversationStore {
    entries: Arc<RwLock<HashMap<String, ConversationMemory>>>,

    /// Idle time after which an entry is eligible for eviction
    ttl: Duration,
}

impl ConversationStore {
    /// Create a store with the given idle TTL
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// Get the conversation for a call, creating an empty one if absent.
    ///
    /// Returns a snapshot. Creation is idempotent: a second call for the
    /// same id returns the existing conversation untouched (the supplied
    /// initial context is ignored in that case).
    pub async fn get_or_create(
        &self,
        call_id: &str,
        initial_context: HashMap<String, serde_json::Value>,
    ) -> ConversationMemory {
        let mut entries = self.entries.write().await;
        entries
            .entry(call_id.to_string())
            .or_insert_with(|| {
                debug!("Initialized conversation memory for call {}", call_id);
                ConversationMemory::new(call_id, initial_context)
            })
            .clone()
    }

    /// Append a turn, creating the conversation if absent
    pub async fn add_turn(&self, call_id: &str, role: TurnRole, content: impl Into<String>) {
        let mut entries = self.entries.write().await;
        let memory = entries
            .entry(call_id.to_string())
            .or_insert_with(|| ConversationMemory::new(call_id, HashMap::new()));

        memory.turns.push(ConversationTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        memory.last_updated_at = Utc::now();
    }

    /// Shallow-merge keys into the conversation context, creating the
    /// conversation if absent. Later values override the same key.
    pub async fn update_context(
        &self,
        call_id: &str,
        partial: HashMap<String, serde_json::Value>,
    ) {
        let mut entries = self.entries.write().await;
        let memory = entries
            .entry(call_id.to_string())
            .or_insert_with(|| ConversationMemory::new(call_id, HashMap::new()));

        memory.context.extend(partial);
        memory.last_updated_at = Utc::now();
    }

    /// Read-only snapshot of a conversation. Does not create.
    pub async fn get(&self, call_id: &str) -> Option<ConversationMemory> {
        self.entries.read().await.get(call_id).cloned()
    }

    /// Render the conversation as one line per turn, caller-facing role
    /// labels first: `"Caller: hi\nAgent: hello"`. Empty string when the
    /// conversation does not exist.
    pub async fn summarize(&self, call_id: &str) -> String {
        let entries = self.entries.read().await;
        match entries.get(call_id) {
            Some(memory) => memory
                .turns
                .iter()
                .map(|turn| format!("{}: {}", turn.role, turn.content))
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }

    /// Remove a conversation. Idempotent: no-op when absent.
    pub async fn clear(&self, call_id: &str) {
        let removed = self.entries.write().await.remove(call_id).is_some();
        if removed {
            info!("Cleared conversation memory for call {}", call_id);
        }
    }

    /// Current entry count and call ids, for the status endpoint
    pub async fn stats(&self) -> (usize, Vec<String>) {
        let entries = self.entries.read().await;
        (entries.len(), entries.keys().cloned().collect())
    }

    /// Run one eviction pass, returning the number of entries removed.
    ///
    /// Candidates are collected under a read lock, then each is re-checked
    /// under the write lock before removal, so a write that lands between
    /// the scan and the delete always wins over eviction. The write lock is
    /// taken per entry, never across the whole pass.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();

        let candidates: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, memory)| now - memory.last_updated_at > self.ttl)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut removed = 0;
        for call_id in candidates {
            let mut entries = self.entries.write().await;
            if let Some(memory) = entries.get(&call_id) {
                if now - memory.last_updated_at > self.ttl {
                    entries.remove(&call_id);
                    removed += 1;
                    info!("Evicted idle conversation memory for call {}", call_id);
                }
            }
        }

        removed
    }

    /// Spawn the background sweeper, running one eviction pass per interval
    /// for the lifetime of the process.
    pub fn spawn_sweeper(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh process
            // doesn't sweep before anything can be stale.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired().await;
                if removed > 0 {
                    debug!("Memory sweep removed {} idle conversations", removed);
                }
            }
        })
    }
}

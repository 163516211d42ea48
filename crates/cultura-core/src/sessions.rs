//! Chat sessions: bounded-capacity table with idle-TTL expiry.
//!
//! Expiry is detected lazily: a read that finds a session idle past its TTL
//! deletes it and reports `SessionExpired`; the next read sees `NotFound`.
//! An optional sweeper task purges idle sessions nobody reads again.
//!
//! Idle time is measured on tokio's clock so it can be driven in tests;
//! wall-clock timestamps are kept for display only.

use crate::config::SessionConfig;
use crate::error::{AiError, AiResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            other => Err(AiError::InvalidInput(format!("unknown chat role: {other}"))),
        }
    }
}

/// One transcript entry. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub event_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

struct Entry {
    session: ChatSession,
    last_seen: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }

    fn touch(&mut self, now: Instant) {
        self.last_seen = now;
        self.session.last_activity = self.session.last_activity.max(Utc::now());
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    max_sessions: usize,
    ttl: Duration,
    sequence: AtomicU64,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_limits(config.max_sessions, config.ttl())
    }

    pub fn with_limits(max_sessions: usize, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            ttl,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Millisecond timestamp, process-wide sequence number and a random
    /// suffix. The sequence alone rules out collisions within one process.
    fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "sess-{:x}-{:x}-{}",
            Utc::now().timestamp_millis(),
            seq,
            &nonce[..8]
        )
    }

    pub fn create_session(&self, user_id: &str, event_id: Option<&str>) -> AiResult<ChatSession> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AiError::InvalidInput("user_id is required".to_string()));
        }
        let event_id = event_id.map(str::trim).filter(|e| !e.is_empty());

        let now = Instant::now();
        let mut sessions = self.lock();
        let ttl = self.ttl;
        sessions.retain(|_, entry| !entry.is_expired(now, ttl));
        if sessions.len() >= self.max_sessions {
            tracing::warn!(
                target: "cultura::sessions",
                max_sessions = self.max_sessions,
                "session table full"
            );
            return Err(AiError::ResourceExhausted(format!(
                "session limit of {} reached",
                self.max_sessions
            )));
        }

        let created = Utc::now();
        let session = ChatSession {
            id: self.next_id(),
            user_id: user_id.to_string(),
            event_id: event_id.map(str::to_string),
            messages: Vec::new(),
            created_at: created,
            last_activity: created,
        };
        sessions.insert(
            session.id.clone(),
            Entry {
                session: session.clone(),
                last_seen: now,
            },
        );
        tracing::debug!(target: "cultura::sessions", session_id = %session.id, user_id, "session created");
        Ok(session)
    }

    /// Run `f` on a live session. Absent → `NotFound`; idle past TTL →
    /// entry removed and `SessionExpired`.
    fn with_live<R>(&self, id: &str, f: impl FnOnce(&mut Entry, Instant) -> R) -> AiResult<R> {
        let now = Instant::now();
        let mut sessions = self.lock();
        let Some(entry) = sessions.get_mut(id) else {
            return Err(AiError::NotFound(format!("session {id}")));
        };
        if entry.is_expired(now, self.ttl) {
            sessions.remove(id);
            tracing::debug!(target: "cultura::sessions", session_id = id, "session expired");
            return Err(AiError::SessionExpired(format!("session {id}")));
        }
        Ok(f(entry, now))
    }

    /// Snapshot of a live session. Reading does not count as activity.
    pub fn get_session(&self, id: &str) -> AiResult<ChatSession> {
        self.with_live(id, |entry, _| entry.session.clone())
    }

    pub fn add_message(&self, id: &str, role: ChatRole, content: &str) -> AiResult<()> {
        self.append_exchange(id, vec![(role, content.to_string())])
    }

    /// Append several messages under one lock acquisition, so no other
    /// append can interleave with them.
    pub fn append_exchange(&self, id: &str, messages: Vec<(ChatRole, String)>) -> AiResult<()> {
        self.with_live(id, |entry, now| {
            for (role, content) in messages {
                let timestamp = Utc::now().max(entry.session.last_activity);
                entry.session.messages.push(ChatMessage {
                    role,
                    content,
                    timestamp,
                });
            }
            entry.touch(now);
        })
    }

    pub fn remove_session(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Sessions still within their TTL.
    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .count()
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every session idle past the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(now, self.ttl));
        before - sessions.len()
    }

    /// Purge expired sessions every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            tracing::debug!(target: "cultura::sessions", purged, "expired sessions swept");
                        }
                    }
                }
            }
        })
    }
}

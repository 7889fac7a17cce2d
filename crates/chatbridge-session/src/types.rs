//! Session records.

use std::time::{Duration, Instant};

use chatbridge_core::Tier;
use serde::Serialize;

/// A live session as tracked by the registry.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    /// Tier whose transport currently backs this session.
    pub tier: Tier,
    pub authenticated: bool,
    /// Monotonic time of the last successful operation.
    pub last_activity: Instant,
    pub model: Option<String>,
    pub created_at: String,
}

impl SessionRecord {
    pub(crate) fn new(id: String, tier: Tier, authenticated: bool) -> Self {
        Self {
            id,
            tier,
            authenticated,
            last_activity: Instant::now(),
            model: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Time since the last successful operation, as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.idle_for(now) > ttl
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            tier: self.tier,
            authenticated: self.authenticated,
            model: self.model.clone(),
            created_at: self.created_at.clone(),
            idle_secs: self.idle_for(Instant::now()).as_secs(),
        }
    }
}

/// Serializable view of a session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub tier: Tier,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "idleSecs")]
    pub idle_secs: u64,
}

/// Generate a fresh opaque session identifier.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

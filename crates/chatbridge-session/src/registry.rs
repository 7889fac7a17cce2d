//! Session registry: the single source of truth for live sessions.
//!
//! Every mutation takes the table lock for the duration of one
//! read-modify-write and never across an `.await`, so operations are
//! linearizable even on a multi-threaded runtime.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chatbridge_core::{Error, Result, Tier};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::types::{new_session_id, SessionRecord, SessionSnapshot};

/// Table of live sessions keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session under a freshly generated id.
    pub fn create(&self, tier: Tier, authenticated: bool) -> String {
        let id = new_session_id();
        self.sessions
            .write()
            .insert(id.clone(), SessionRecord::new(id.clone(), tier, authenticated));
        info!("Session created: {} (tier={}, authenticated={})", id, tier, authenticated);
        id
    }

    /// Register a session under an id chosen by the caller, typically one
    /// whose transport resource was established before registration.
    pub fn insert(&self, id: &str, tier: Tier, authenticated: bool) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(id) {
            return Err(Error::Internal(format!("Session {} already registered", id)));
        }
        sessions.insert(id.to_string(), SessionRecord::new(id.to_string(), tier, authenticated));
        drop(sessions);
        info!("Session created: {} (tier={}, authenticated={})", id, tier, authenticated);
        Ok(())
    }

    /// Refresh last activity to now.
    pub fn touch(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        record.last_activity = Instant::now();
        Ok(())
    }

    /// Move a session onto another tier after fallback.
    pub fn reassign_tier(&self, id: &str, tier: Tier, authenticated: bool) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        let previous = record.tier;
        record.tier = tier;
        record.authenticated = authenticated;
        record.last_activity = Instant::now();
        drop(sessions);
        info!("Session {} reassigned: {} -> {}", id, previous, tier);
        Ok(())
    }

    /// Record the model a session was asked to use.
    pub fn set_model(&self, id: &str, model: Option<String>) -> Result<()> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        record.model = model;
        Ok(())
    }

    /// Get a copy of a session record.
    pub fn get(&self, id: &str) -> Result<SessionRecord> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Remove a session. Whoever receives `Some` owns releasing its transport.
    pub fn remove(&self, id: &str) -> Option<SessionRecord> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            debug!("Session removed: {}", id);
        }
        removed
    }

    /// Atomically remove and return every session idle longer than `ttl`.
    pub fn take_expired(&self, now: Instant, ttl: Duration) -> Vec<SessionRecord> {
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(now, ttl))
            .map(|s| s.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }

    /// Remove and return every session (shutdown).
    pub fn drain(&self) -> Vec<SessionRecord> {
        self.sessions.write().drain().map(|(_, s)| s).collect()
    }

    /// List all sessions, most recently active first.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read();
        let mut records: Vec<&SessionRecord> = sessions.values().collect();
        records.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        records.into_iter().map(|s| s.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

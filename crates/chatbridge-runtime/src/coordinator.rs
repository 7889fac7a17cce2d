//! Fallback coordinator: tier selection, escalation and human relay.
//!
//! Tiers are tried in list order. A session starts on the first tier that is
//! available and can be established. On a tier failure the next tier is
//! established under the same session id, the registry record is flipped and
//! the failed tier's resource is released before the retry. A registry
//! entry therefore always has a live resource behind it: when no later tier
//! exists the session keeps its current one. Each tier is tried at most once
//! per request, and escalation never moves backwards. When no automated tier
//! produced an answer the request is handed to the human relay.

use std::sync::Arc;
use std::time::Duration;

use chatbridge_core::{Error, Result, Tier};
use chatbridge_relay::{HumanRelayBridge, RelayOutcome};
use chatbridge_session::{new_session_id, SessionRegistry, SessionTeardown};
use tracing::{debug, info, warn};

use crate::tiers::{TierStrategy, TierTeardown};
use crate::types::{RequestOptions, SessionOptions};

/// Relay behaviour once automated tiers are exhausted.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub enabled: bool,
    /// `None` waits until an answer, a cancellation or an unregister.
    pub timeout: Option<Duration>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: None,
        }
    }
}

/// Unregisters a relay request if the waiting caller goes away.
struct RelayGuard<'a> {
    relay: &'a HumanRelayBridge,
    request_id: String,
}

impl Drop for RelayGuard<'_> {
    fn drop(&mut self) {
        // No-op once the request was delivered or timed out.
        self.relay.unregister(&self.request_id);
    }
}

pub struct FallbackCoordinator {
    registry: Arc<SessionRegistry>,
    tiers: Vec<Arc<dyn TierStrategy>>,
    teardown: Arc<TierTeardown>,
    relay: Arc<HumanRelayBridge>,
    relay_settings: RelaySettings,
}

impl FallbackCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        tiers: Vec<Arc<dyn TierStrategy>>,
        relay: Arc<HumanRelayBridge>,
        relay_settings: RelaySettings,
    ) -> Self {
        let teardown = Arc::new(TierTeardown::new(tiers.clone()));
        Self {
            registry,
            tiers,
            teardown,
            relay,
            relay_settings,
        }
    }

    /// Teardown shared with the expiry reaper.
    pub fn teardown(&self) -> Arc<TierTeardown> {
        self.teardown.clone()
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    pub fn relay_enabled(&self) -> bool {
        self.relay_settings.enabled
    }

    fn position(&self, tier: Tier) -> Option<usize> {
        self.tiers.iter().position(|t| t.tier() == tier)
    }

    /// Establish a session on the first usable tier and register it.
    ///
    /// Fails with `AllTiersExhausted` when no automated tier could be
    /// established.
    pub async fn open_session(&self, options: &SessionOptions) -> Result<String> {
        let start = match options.tier {
            Some(tier) => self
                .position(tier)
                .ok_or_else(|| Error::Config(format!("No {} tier configured", tier)))?,
            None => 0,
        };

        let session_id = new_session_id();
        let mut last_error = None;

        for strategy in &self.tiers[start..] {
            let tier = strategy.tier();
            if !strategy.available().await {
                debug!("{} tier unavailable; skipping", tier);
                continue;
            }
            match strategy.establish(&session_id).await {
                Ok(authenticated) => {
                    if let Err(e) = self.registry.insert(&session_id, tier, authenticated) {
                        self.release(strategy.as_ref(), &session_id).await;
                        return Err(e);
                    }
                    if options.model.is_some() {
                        self.registry
                            .set_model(&session_id, options.model.clone())?;
                    }
                    info!(
                        "Session {} opened on {} tier (authenticated={})",
                        session_id, tier, authenticated
                    );
                    return Ok(session_id);
                }
                Err(e) => {
                    warn!("Could not establish {} tier: {}", tier, e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::exhausted(last_error.unwrap_or_else(|| {
            Error::Internal("No automated tier available".into())
        })))
    }

    /// Answer `prompt` on an existing session, escalating on tier failure.
    ///
    /// `Ok(None)` means a human cancelled the relayed request.
    pub async fn get_response(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<Option<String>> {
        let record = self.registry.get(session_id)?;
        let mut options = options.clone();
        if options.model.is_none() {
            options.model = record.model.clone();
        }

        let mut index = self.position(record.tier).ok_or_else(|| {
            Error::Internal(format!("Session {} is on unknown tier {}", session_id, record.tier))
        })?;
        let mut last_error;

        loop {
            let strategy = &self.tiers[index];
            match strategy.attempt(session_id, prompt, &options).await {
                Ok(text) => {
                    if let Err(e) = self.registry.touch(session_id) {
                        warn!("Session {} reclaimed while answering: {}", session_id, e);
                    }
                    return Ok(Some(text));
                }
                Err(e) if !e.is_tier_failure() => return Err(e),
                Err(e) => {
                    warn!(
                        "{} tier failed for session {}: {}",
                        strategy.tier(),
                        session_id,
                        e
                    );
                    last_error = e;
                }
            }

            if options.disable_fallback {
                debug!("Fallback disabled for this request");
                break;
            }
            match self.escalate(session_id, index).await? {
                Some(next) => index = next,
                None => break,
            }
        }

        if !self.registry.contains(session_id) {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        self.relay_or_fail(prompt, last_error).await
    }

    /// Move the session from tier `from` to the next tier that can be
    /// established, releasing `from` only once the move succeeded.
    /// `Ok(None)` when no later tier is usable; the session then stays on
    /// `from` with its resource intact so a later request can retry it.
    async fn escalate(&self, session_id: &str, from: usize) -> Result<Option<usize>> {
        for (next, strategy) in self.tiers.iter().enumerate().skip(from + 1) {
            let tier = strategy.tier();
            if !strategy.available().await {
                debug!("{} tier unavailable; skipping", tier);
                continue;
            }
            match strategy.establish(session_id).await {
                Ok(authenticated) => {
                    // The reaper may have claimed the session meanwhile; it
                    // then owns the release of `from`.
                    if let Err(e) = self.registry.reassign_tier(session_id, tier, authenticated) {
                        self.release(strategy.as_ref(), session_id).await;
                        return Err(e);
                    }
                    self.release(self.tiers[from].as_ref(), session_id).await;
                    info!(
                        "Session {} escalated {} -> {}",
                        session_id,
                        self.tiers[from].tier(),
                        tier
                    );
                    return Ok(Some(next));
                }
                Err(e) => warn!(
                    "Could not establish {} tier for session {}: {}",
                    tier, session_id, e
                ),
            }
        }
        debug!(
            "No tier after {} for session {}; keeping it",
            self.tiers[from].tier(),
            session_id
        );
        Ok(None)
    }

    async fn relay_or_fail(&self, prompt: &str, last_error: Error) -> Result<Option<String>> {
        if !self.relay_settings.enabled {
            return Err(Error::exhausted(last_error));
        }

        let request_id = HumanRelayBridge::new_request_id();
        let ticket = self.relay.register(&request_id, Some(prompt));
        let _guard = RelayGuard {
            relay: &self.relay,
            request_id: request_id.clone(),
        };
        info!(
            "Automated tiers exhausted; awaiting human answer for relay request {}",
            request_id
        );

        match self.relay.wait(ticket, self.relay_settings.timeout).await {
            RelayOutcome::Answered(text) => Ok(Some(text)),
            RelayOutcome::Cancelled => Ok(None),
            RelayOutcome::TimedOut | RelayOutcome::Abandoned => Err(Error::exhausted(last_error)),
        }
    }

    /// Open a session, answer `prompt` and close the session again.
    pub async fn respond(&self, prompt: &str, options: &RequestOptions) -> Result<Option<String>> {
        let session_options = SessionOptions {
            model: options.model.clone(),
            tier: None,
        };
        let session_id = match self.open_session(&session_options).await {
            Ok(id) => id,
            Err(Error::AllTiersExhausted { last }) => {
                return self.relay_or_fail(prompt, *last).await;
            }
            Err(e) => return Err(e),
        };

        let result = self.get_response(&session_id, prompt, options).await;
        self.close_session(&session_id).await;
        result
    }

    /// Remove the session and release its resource. `false` if it was
    /// already gone. Never fails.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let Some(record) = self.registry.remove(session_id) else {
            return false;
        };
        if let Err(e) = self.teardown.teardown(&record).await {
            warn!("Failed to release session {}: {}", session_id, e);
        }
        info!("Session {} closed", session_id);
        true
    }

    /// Close every registered session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let records = self.registry.drain();
        let count = records.len();
        for record in records {
            if let Err(e) = self.teardown.teardown(&record).await {
                warn!("Failed to release session {}: {}", record.id, e);
            }
        }
        count
    }

    async fn release(&self, strategy: &dyn TierStrategy, session_id: &str) {
        if let Err(e) = strategy.release(session_id).await {
            warn!(
                "Failed to release {} tier for session {}: {}",
                strategy.tier(),
                session_id,
                e
            );
        }
    }
}

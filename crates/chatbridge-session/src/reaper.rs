//! Expiry reaper: periodic reclamation of idle sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatbridge_core::Result;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;
use crate::types::SessionRecord;

/// Releases the transport resource behind a reclaimed session.
#[async_trait]
pub trait SessionTeardown: Send + Sync {
    async fn teardown(&self, session: &SessionRecord) -> Result<()>;
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed: Vec<String>,
    pub teardown_failures: usize,
}

struct Running {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Closes and evicts sessions idle past the TTL.
pub struct ExpiryReaper {
    registry: Arc<SessionRegistry>,
    teardown: Arc<dyn SessionTeardown>,
    ttl: Duration,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl ExpiryReaper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        teardown: Arc<dyn SessionTeardown>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            teardown,
            ttl,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Run one sweep as of now.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now()).await
    }

    /// Run one sweep as of `now`.
    ///
    /// Expired entries are claimed from the registry before teardown, so a
    /// concurrent close of the same session cannot release it a second time.
    pub async fn sweep_at(&self, now: Instant) -> SweepReport {
        sweep(&self.registry, self.teardown.as_ref(), now, self.ttl).await
    }

    /// Spawn the periodic sweep task. Calling `start` twice is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let registry = self.registry.clone();
        let teardown = self.teardown.clone();
        let ttl = self.ttl;
        let period = self.interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            info!(
                "Expiry reaper started (ttl={}s, interval={}s)",
                ttl.as_secs(),
                period.as_secs()
            );
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        sweep(&registry, teardown.as_ref(), Instant::now(), ttl).await;
                    }
                }
            }
            info!("Expiry reaper stopped");
        });

        *running = Some(Running { shutdown_tx, handle });
    }

    /// Stop the periodic task and wait for it to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown_tx, handle }) = running {
            let _ = shutdown_tx.send(());
            if let Err(e) = handle.await {
                warn!("Expiry reaper task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ExpiryReaper {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.handle.abort();
        }
    }
}

async fn sweep(
    registry: &SessionRegistry,
    teardown: &dyn SessionTeardown,
    now: Instant,
    ttl: Duration,
) -> SweepReport {
    let expired = registry.take_expired(now, ttl);
    let mut report = SweepReport::default();

    for session in expired {
        debug!(
            "Reclaiming idle session {} (tier={}, idle={}s)",
            session.id,
            session.tier,
            session.idle_for(now).as_secs()
        );
        if let Err(e) = teardown.teardown(&session).await {
            warn!("Teardown of session {} failed: {}", session.id, e);
            report.teardown_failures += 1;
        }
        report.reclaimed.push(session.id);
    }

    if !report.reclaimed.is_empty() {
        info!(
            "Reaper reclaimed {} idle session(s), {} teardown failure(s)",
            report.reclaimed.len(),
            report.teardown_failures
        );
    }

    report
}

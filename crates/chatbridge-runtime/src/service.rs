//! `ChatBridge`: the caller-facing service.

use std::sync::Arc;
use std::time::Duration;

use chatbridge_api::{ApiClient, ApiConfig};
use chatbridge_browser::{BrowserDriver, BrowserDriverConfig, BrowserEngine, CdpEngine};
use chatbridge_core::{BridgeConfig, CredentialProvider, FileCredentials, Result};
use chatbridge_relay::{HumanRelayBridge, PendingRelayRequest};
use chatbridge_session::{ExpiryReaper, SessionRecord, SessionRegistry, SweepReport};
use tracing::{debug, info};

use crate::coordinator::{FallbackCoordinator, RelaySettings};
use crate::tiers::{ApiTier, BrowserTier, TierStrategy};
use crate::types::{BridgeStatus, RelayResponse, RequestOptions, SessionOptions};

pub struct ChatBridge {
    registry: Arc<SessionRegistry>,
    relay: Arc<HumanRelayBridge>,
    coordinator: FallbackCoordinator,
    reaper: ExpiryReaper,
}

impl ChatBridge {
    /// Wire the default tiers: API first, then the browser.
    pub fn new(
        config: &BridgeConfig,
        credentials: Arc<dyn CredentialProvider>,
        api: Arc<ApiClient>,
        driver: Arc<BrowserDriver>,
    ) -> Self {
        let tiers: Vec<Arc<dyn TierStrategy>> = vec![
            Arc::new(ApiTier::new(credentials.clone(), api)),
            Arc::new(BrowserTier::new(driver, credentials)),
        ];
        Self::with_tiers(config, tiers)
    }

    /// Build from an explicit, ordered tier list.
    pub fn with_tiers(config: &BridgeConfig, tiers: Vec<Arc<dyn TierStrategy>>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let relay = Arc::new(HumanRelayBridge::new());
        let coordinator = FallbackCoordinator::new(
            registry.clone(),
            tiers,
            relay.clone(),
            RelaySettings {
                enabled: config.relay_enabled,
                timeout: config.relay_timeout,
            },
        );
        let reaper = ExpiryReaper::new(
            registry.clone(),
            coordinator.teardown(),
            config.session_ttl,
            config.sweep_interval,
        );
        Self {
            registry,
            relay,
            coordinator,
            reaper,
        }
    }

    /// Production wiring: credentials and transport configuration from the
    /// data directory, reqwest for the API and CDP for the browser.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let paths = &config.data_paths;
        let credentials: Arc<dyn CredentialProvider> =
            Arc::new(FileCredentials::new(&paths.credentials_file));

        let api_config = ApiConfig::load(&paths.api_config_file);
        info!(
            "API tier: provider={}, model={}",
            api_config.provider,
            api_config.default_model()
        );
        let api = Arc::new(ApiClient::with_reqwest(api_config)?);

        let driver_config = BrowserDriverConfig::load(&paths.browser_driver);
        info!(
            "Browser tier: service={}, headless={}",
            driver_config.service_url, driver_config.headless
        );
        let engine: Arc<dyn BrowserEngine> = Arc::new(CdpEngine::new()?);
        let driver = Arc::new(BrowserDriver::new(engine, driver_config));

        Ok(Self::new(config, credentials, api, driver))
    }

    /// Start the expiry reaper.
    pub fn start(&self) {
        self.reaper.start();
    }

    /// Stop the reaper, close every session and abandon pending relays.
    pub async fn shutdown(&self) {
        self.reaper.stop().await;
        let closed = self.coordinator.close_all().await;
        let mut abandoned = 0;
        for request in self.relay.pending() {
            if self.relay.unregister(&request.request_id) {
                abandoned += 1;
            }
        }
        info!(
            "ChatBridge shut down: {} sessions closed, {} relay requests abandoned",
            closed, abandoned
        );
    }

    pub async fn create_session(&self, options: SessionOptions) -> Result<String> {
        self.coordinator.open_session(&options).await
    }

    /// `Ok(None)` only when a human cancelled the relayed request.
    pub async fn get_response(
        &self,
        session_id: &str,
        prompt: &str,
        options: RequestOptions,
    ) -> Result<Option<String>> {
        self.coordinator
            .get_response(session_id, prompt, &options)
            .await
    }

    pub async fn close_session(&self, session_id: &str) -> bool {
        self.coordinator.close_session(session_id).await
    }

    /// One-shot request: open, answer, close.
    pub async fn respond(&self, prompt: &str, options: RequestOptions) -> Result<Option<String>> {
        self.coordinator.respond(prompt, &options).await
    }

    pub fn register_human_relay_callback<F>(&self, request_id: &str, callback: F)
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        self.relay.register_callback(request_id, None, callback);
    }

    pub fn deliver_human_relay_response(&self, response: RelayResponse) -> bool {
        if let Some(prompt) = &response.prompt {
            debug!(
                "Relay response for {} answers a {}-char prompt",
                response.request_id,
                prompt.len()
            );
        }
        self.relay
            .deliver(&response.request_id, response.delivery())
    }

    pub fn pending_relays(&self) -> Vec<PendingRelayRequest> {
        self.relay.pending()
    }

    pub fn session(&self, session_id: &str) -> Result<SessionRecord> {
        self.registry.get(session_id)
    }

    /// Run one reaper sweep now.
    pub async fn sweep(&self) -> SweepReport {
        self.reaper.sweep().await
    }

    pub fn session_ttl(&self) -> Duration {
        self.reaper.ttl()
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            tiers: self.coordinator.tiers(),
            sessions: self.registry.list(),
            pending_relays: self.relay.len(),
            relay_enabled: self.coordinator.relay_enabled(),
            reaper_running: self.reaper.is_running(),
            session_ttl_secs: self.reaper.ttl().as_secs(),
        }
    }
}

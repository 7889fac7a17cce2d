//! Automated tier strategies the coordinator iterates over.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatbridge_api::{ApiClient, CredentialGate, GateDecision};
use chatbridge_browser::BrowserDriver;
use chatbridge_core::{CredentialProvider, Error, Result, Tier};
use chatbridge_session::{SessionRecord, SessionTeardown};
use parking_lot::Mutex;
use tracing::debug;

use crate::types::RequestOptions;

/// One automated transport tier.
#[async_trait]
pub trait TierStrategy: Send + Sync {
    fn tier(&self) -> Tier;

    /// Cheap check whether the tier can be tried at all. Must not do
    /// network I/O.
    async fn available(&self) -> bool;

    /// Set up the transport for `session_id`. Returns the authenticated flag.
    async fn establish(&self, session_id: &str) -> Result<bool>;

    async fn attempt(&self, session_id: &str, prompt: &str, options: &RequestOptions)
        -> Result<String>;

    /// Release whatever `establish` acquired. Releasing twice is a no-op.
    async fn release(&self, session_id: &str) -> Result<()>;
}

/// Direct API tier. Holds the verified key per session; no other resource.
pub struct ApiTier {
    gate: CredentialGate,
    credentials: Arc<dyn CredentialProvider>,
    client: Arc<ApiClient>,
    keys: Mutex<HashMap<String, String>>,
}

impl ApiTier {
    pub fn new(credentials: Arc<dyn CredentialProvider>, client: Arc<ApiClient>) -> Self {
        Self {
            gate: CredentialGate::new(credentials.clone(), client.clone()),
            credentials,
            client,
            keys: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TierStrategy for ApiTier {
    fn tier(&self) -> Tier {
        Tier::Api
    }

    async fn available(&self) -> bool {
        self.gate.has_api_key()
    }

    async fn establish(&self, session_id: &str) -> Result<bool> {
        match self.gate.check().await {
            GateDecision::Valid(key) => {
                self.keys.lock().insert(session_id.to_string(), key);
                Ok(true)
            }
            GateDecision::Invalid => Err(Error::AuthenticationFailed(
                "API key rejected by the service".into(),
            )),
            GateDecision::Missing => Err(Error::AuthenticationFailed(
                "No API key configured".into(),
            )),
        }
    }

    async fn attempt(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        let cached = self.keys.lock().get(session_id).cloned();
        let key = match cached {
            Some(key) => key,
            None => self
                .credentials
                .credentials()
                .api_key()
                .map(str::to_string)
                .ok_or_else(|| Error::AuthenticationFailed("No API key configured".into()))?,
        };
        self.client
            .complete(&key, prompt, &options.completion())
            .await
    }

    async fn release(&self, session_id: &str) -> Result<()> {
        if self.keys.lock().remove(session_id).is_some() {
            debug!("Released API session {}", session_id);
        }
        Ok(())
    }
}

/// Headless browser tier.
pub struct BrowserTier {
    driver: Arc<BrowserDriver>,
    credentials: Arc<dyn CredentialProvider>,
}

impl BrowserTier {
    pub fn new(driver: Arc<BrowserDriver>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            driver,
            credentials,
        }
    }
}

#[async_trait]
impl TierStrategy for BrowserTier {
    fn tier(&self) -> Tier {
        Tier::Browser
    }

    async fn available(&self) -> bool {
        true
    }

    async fn establish(&self, session_id: &str) -> Result<bool> {
        let credentials = self.credentials.credentials();
        self.driver.create(session_id, &credentials).await
    }

    async fn attempt(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        self.driver
            .submit(session_id, prompt, options.model.as_deref())
            .await
    }

    async fn release(&self, session_id: &str) -> Result<()> {
        self.driver.close(session_id).await;
        Ok(())
    }
}

/// Releases a session's resource through the strategy for its tier. Shared
/// by the coordinator's close path and the expiry reaper.
pub struct TierTeardown {
    tiers: Vec<Arc<dyn TierStrategy>>,
}

impl TierTeardown {
    pub fn new(tiers: Vec<Arc<dyn TierStrategy>>) -> Self {
        Self { tiers }
    }
}

#[async_trait]
impl SessionTeardown for TierTeardown {
    async fn teardown(&self, session: &SessionRecord) -> Result<()> {
        match self.tiers.iter().find(|t| t.tier() == session.tier) {
            Some(strategy) => strategy.release(&session.id).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_api::{ApiConfig, HttpResponse, HttpTransport};
    use chatbridge_core::StaticCredentials;

    struct StatusHttp(u16, &'static str);

    #[async_trait]
    impl HttpTransport for StatusHttp {
        async fn get(&self, _url: &str, _headers: &[(String, String)]) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: self.0,
                body: self.1.into(),
            })
        }

        async fn post(
            &self,
            _url: &str,
            _headers: &[(String, String)],
            _body: &serde_json::Value,
        ) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: self.0,
                body: self.1.into(),
            })
        }
    }

    fn api_tier(creds: StaticCredentials, status: u16, body: &'static str) -> ApiTier {
        let client = Arc::new(ApiClient::new(
            ApiConfig::default(),
            Arc::new(StatusHttp(status, body)),
        ));
        ApiTier::new(Arc::new(creds), client)
    }

    #[tokio::test]
    async fn test_api_tier_unavailable_without_key() {
        let tier = api_tier(StaticCredentials::none(), 200, "{}");
        assert!(!tier.available().await);
        assert!(matches!(
            tier.establish("s1").await,
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_api_tier_rejected_key_fails_establish() {
        let tier = api_tier(StaticCredentials::api_key("sk-bad"), 401, "{}");
        assert!(tier.available().await);
        assert!(tier.establish("s1").await.is_err());
    }

    #[tokio::test]
    async fn test_api_tier_round_trip() {
        let tier = api_tier(
            StaticCredentials::api_key("sk-live"),
            200,
            r#"{"choices": [{"message": {"content": "pong"}}]}"#,
        );
        assert!(tier.establish("s1").await.unwrap());
        let text = tier
            .attempt("s1", "ping", &RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "pong");
        tier.release("s1").await.unwrap();
        tier.release("s1").await.unwrap();
    }
}

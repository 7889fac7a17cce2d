//! Credential gate: decides whether a session may start on the API tier.

use std::sync::Arc;

use chatbridge_core::CredentialProvider;
use tracing::info;

use crate::client::ApiClient;

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// No API key configured.
    Missing,
    /// A key is configured but the API rejected it.
    Invalid,
    /// Key verified; carries the key for subsequent calls.
    Valid(String),
}

impl GateDecision {
    pub fn is_valid(&self) -> bool {
        matches!(self, GateDecision::Valid(_))
    }
}

pub struct CredentialGate {
    provider: Arc<dyn CredentialProvider>,
    client: Arc<ApiClient>,
}

impl CredentialGate {
    pub fn new(provider: Arc<dyn CredentialProvider>, client: Arc<ApiClient>) -> Self {
        Self { provider, client }
    }

    pub fn has_api_key(&self) -> bool {
        self.provider.credentials().api_key().is_some()
    }

    /// Read the current key and probe it. Credentials are re-read on every
    /// call so rotated keys take effect without a restart.
    pub async fn check(&self) -> GateDecision {
        let credentials = self.provider.credentials();
        let Some(key) = credentials.api_key() else {
            return GateDecision::Missing;
        };

        if self.client.verify_credentials(key).await {
            GateDecision::Valid(key.to_string())
        } else {
            info!("Configured API key failed verification");
            GateDecision::Invalid
        }
    }
}

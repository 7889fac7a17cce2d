//! Runtime types: caller-facing options and status.

use chatbridge_api::CompletionOptions;
use chatbridge_core::Tier;
use chatbridge_relay::RelayDelivery;
use chatbridge_session::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// Options for opening a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Default model for requests on this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Start at this tier instead of the first available one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

/// Per-request options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Stay on the session's current tier; no automated escalation.
    #[serde(default)]
    pub disable_fallback: bool,
}

impl RequestOptions {
    pub fn completion(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// A human's answer to a pending relay request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    /// The prompt being answered, echoed back by the operator. Informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl RelayResponse {
    pub fn delivery(&self) -> RelayDelivery {
        RelayDelivery {
            text: self.text.clone(),
            cancelled: self.cancelled,
        }
    }
}

/// Snapshot of the bridge for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub tiers: Vec<Tier>,
    pub sessions: Vec<SessionSnapshot>,
    pub pending_relays: usize,
    pub relay_enabled: bool,
    pub reaper_running: bool,
    pub session_ttl_secs: u64,
}

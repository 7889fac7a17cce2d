//! Browser driver types.

use serde::{Deserialize, Serialize};

/// Lifecycle of one session's browser context.
///
/// `Launched -> Authenticating -> Authenticated | Unauthenticated -> Ready -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverState {
    Launched,
    Authenticating,
    Authenticated,
    Unauthenticated,
    Ready,
    Closed,
}

impl DriverState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Launched => "launched",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
            Self::Ready => "ready",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters for launching one isolated browser context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    pub headless: bool,
    /// Explicit browser executable; discovered on PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Mask automation fingerprints (`navigator.webdriver`, blink flag).
    pub stealth: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// How long to wait for the browser's debugging endpoint.
    pub launch_timeout_ms: u64,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_agent: None,
            stealth: true,
            window_width: 1280,
            window_height: 900,
            launch_timeout_ms: 30_000,
        }
    }
}

/// Opaque reference to a launched browser context, issued by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineHandle(String);

impl EngineHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status view of one browser context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    pub session_id: String,
    pub state: DriverState,
    pub authenticated: bool,
    pub launched_at: String,
}

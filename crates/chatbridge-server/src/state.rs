//! Shared application state.

use std::time::Instant;

use chatbridge_core::BridgeConfig;
use chatbridge_runtime::ChatBridge;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: BridgeConfig,
    pub bridge: ChatBridge,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: BridgeConfig, bridge: ChatBridge) -> Self {
        Self {
            config,
            bridge,
            started_at: Instant::now(),
        }
    }
}

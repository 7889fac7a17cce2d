//! Runtime: fallback coordination across the API, browser and human tiers.
//!
//! `ChatBridge` is the caller-facing service. It owns the session registry,
//! the expiry reaper, the human relay bridge and a `FallbackCoordinator`
//! iterating an ordered list of `TierStrategy` objects.

pub mod coordinator;
pub mod service;
pub mod tiers;
pub mod types;

pub use coordinator::{FallbackCoordinator, RelaySettings};
pub use service::ChatBridge;
pub use tiers::{ApiTier, BrowserTier, TierStrategy, TierTeardown};
pub use types::*;

//! Session registry and expiry reaper.
//!
//! The registry maps session ids to the tier backing them; the reaper
//! reclaims sessions that have been idle past a fixed TTL.

pub mod reaper;
pub mod registry;
pub mod types;

pub use reaper::{ExpiryReaper, SessionTeardown, SweepReport};
pub use registry::SessionRegistry;
pub use types::*;

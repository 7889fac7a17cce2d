//! Browser tier: drives the AI service's web UI in an isolated, automation-
//! masked browser context per session.
//!
//! `BrowserDriver` holds the per-session state machine and is written
//! against the `BrowserEngine` capability; `CdpEngine` implements that
//! capability over the Chrome DevTools Protocol.

pub mod cdp;
pub mod config;
pub mod driver;
pub mod engine;
pub mod types;

#[cfg(test)]
mod testing;

pub use cdp::CdpEngine;
pub use config::{BrowserDriverConfig, DriverSelectors};
pub use driver::BrowserDriver;
pub use engine::BrowserEngine;
pub use types::*;

//! Browser engine capability consumed by the driver.

use std::time::Duration;

use async_trait::async_trait;
use chatbridge_core::Result;

use crate::types::{EngineHandle, LaunchOptions};

/// Low-level page automation. Every operation addresses the context behind
/// `handle`; selectors are CSS selectors evaluated in the page.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<EngineHandle>;

    async fn navigate(&self, handle: &EngineHandle, url: &str) -> Result<()>;

    /// Whether at least one element currently matches `selector`.
    async fn find(&self, handle: &EngineHandle, selector: &str) -> Result<bool>;

    /// Number of elements currently matching `selector`.
    async fn count(&self, handle: &EngineHandle, selector: &str) -> Result<usize>;

    async fn click(&self, handle: &EngineHandle, selector: &str) -> Result<()>;

    /// Replace the content of the first matching input with `text`.
    async fn fill(&self, handle: &EngineHandle, selector: &str, text: &str) -> Result<()>;

    /// Poll until `selector` matches or `timeout` elapses. `Ok(false)` on timeout.
    async fn wait_for(
        &self,
        handle: &EngineHandle,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool>;

    /// Poll until at least `at_least` elements match `selector` or `timeout`
    /// elapses. `Ok(false)` on timeout.
    async fn wait_for_count(
        &self,
        handle: &EngineHandle,
        selector: &str,
        at_least: usize,
        timeout: Duration,
    ) -> Result<bool>;

    /// Visible text of the last element matching `selector`.
    async fn extract_text(&self, handle: &EngineHandle, selector: &str) -> Result<String>;

    /// Release the context. Closing an unknown or already closed handle is `Ok`.
    async fn close(&self, handle: &EngineHandle) -> Result<()>;
}

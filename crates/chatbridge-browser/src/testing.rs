//! In-memory `BrowserEngine` for driver tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatbridge_core::{Error, Result, Tier};
use parking_lot::Mutex;

use crate::engine::BrowserEngine;
use crate::types::{EngineHandle, LaunchOptions};

/// Simulated page: per-selector element counts, click-triggered reveals and
/// the text of the last response. Waits never sleep.
#[derive(Default)]
pub struct FakeEngine {
    elements: Mutex<HashMap<String, usize>>,
    reveals: Mutex<HashMap<String, String>>,
    text: Mutex<Option<String>>,
    replies: Mutex<VecDeque<String>>,
    fail_navigation: Mutex<bool>,
    navigation_gate: Mutex<Option<Arc<tokio::sync::Notify>>>,
    ops: Mutex<Vec<String>>,
    launches: Mutex<usize>,
    closes: Mutex<usize>,
}

impl FakeEngine {
    /// Make sure at least one element matches `selector`.
    pub fn show(&self, selector: &str) {
        let mut elements = self.elements.lock();
        let count = elements.entry(selector.to_string()).or_insert(0);
        *count = (*count).max(1);
    }

    /// Every click on `trigger` adds one more `revealed` element, and the
    /// next queued reply (if any) becomes the last response text.
    pub fn reveal_on_click(&self, trigger: &str, revealed: &str) {
        self.reveals
            .lock()
            .insert(trigger.to_string(), revealed.to_string());
    }

    pub fn set_text(&self, text: &str) {
        *self.text.lock() = Some(text.to_string());
    }

    pub fn push_reply(&self, text: &str) {
        self.replies.lock().push_back(text.to_string());
    }

    pub fn fail_navigation(&self) {
        *self.fail_navigation.lock() = true;
    }

    /// Hold every navigation until the returned gate is notified.
    pub fn pause_navigation(&self) -> Arc<tokio::sync::Notify> {
        let gate = Arc::new(tokio::sync::Notify::new());
        *self.navigation_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    pub fn launches(&self) -> usize {
        *self.launches.lock()
    }

    pub fn closes(&self) -> usize {
        *self.closes.lock()
    }

    fn record(&self, op: String) {
        self.ops.lock().push(op);
    }

    fn element_count(&self, selector: &str) -> usize {
        self.elements.lock().get(selector).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn launch(&self, _options: &LaunchOptions) -> Result<EngineHandle> {
        let mut launches = self.launches.lock();
        *launches += 1;
        Ok(EngineHandle::new(format!("fake-{}", *launches)))
    }

    async fn navigate(&self, _handle: &EngineHandle, url: &str) -> Result<()> {
        self.record(format!("navigate {}", url));
        let gate = self.navigation_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail_navigation.lock() {
            return Err(Error::transport(Tier::Browser, "net::ERR_NAME_NOT_RESOLVED"));
        }
        Ok(())
    }

    async fn find(&self, _handle: &EngineHandle, selector: &str) -> Result<bool> {
        Ok(self.element_count(selector) > 0)
    }

    async fn count(&self, _handle: &EngineHandle, selector: &str) -> Result<usize> {
        Ok(self.element_count(selector))
    }

    async fn click(&self, _handle: &EngineHandle, selector: &str) -> Result<()> {
        self.record(format!("click {}", selector));
        let revealed = self.reveals.lock().get(selector).cloned();
        if let Some(revealed) = revealed {
            if let Some(reply) = self.replies.lock().pop_front() {
                *self.text.lock() = Some(reply);
            }
            *self.elements.lock().entry(revealed).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn fill(&self, _handle: &EngineHandle, selector: &str, text: &str) -> Result<()> {
        self.record(format!("fill {} {}", selector, text));
        Ok(())
    }

    async fn wait_for(
        &self,
        handle: &EngineHandle,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool> {
        self.find(handle, selector).await
    }

    async fn wait_for_count(
        &self,
        _handle: &EngineHandle,
        selector: &str,
        at_least: usize,
        _timeout: Duration,
    ) -> Result<bool> {
        Ok(self.element_count(selector) >= at_least)
    }

    async fn extract_text(&self, _handle: &EngineHandle, selector: &str) -> Result<String> {
        self.text
            .lock()
            .clone()
            .ok_or_else(|| Error::transport(Tier::Browser, format!("No element matches {}", selector)))
    }

    async fn close(&self, _handle: &EngineHandle) -> Result<()> {
        *self.closes.lock() += 1;
        Ok(())
    }
}

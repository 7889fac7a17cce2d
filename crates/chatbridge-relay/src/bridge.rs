//! Human relay bridge: pending requests answered by a person.
//!
//! Each pending request owns a single-shot slot. Delivery removes the slot
//! from the table before fulfilling it, so a request is answered at most
//! once and any later delivery for the same id finds nothing.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Callback invoked with the human's answer, or `None` on cancellation.
pub type RelayCallback = Box<dyn FnOnce(Option<String>) + Send + 'static>;

enum Slot {
    Waiter(oneshot::Sender<Option<String>>),
    Callback(RelayCallback),
}

impl Slot {
    fn fulfil(self, value: Option<String>) {
        match self {
            // The waiter may have given up already; nothing to do then.
            Slot::Waiter(tx) => {
                let _ = tx.send(value);
            }
            Slot::Callback(callback) => callback(value),
        }
    }
}

struct PendingEntry {
    slot: Slot,
    info: PendingRelayRequest,
}

/// A request waiting on a human, as shown to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRelayRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(rename = "registeredAt")]
    pub registered_at: String,
}

/// An answer (or cancellation) supplied by a human.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayDelivery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl RelayDelivery {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            cancelled: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            text: None,
            cancelled: true,
        }
    }

    /// Value handed to the waiter: the text, unless cancelled.
    pub fn into_value(self) -> Option<String> {
        if self.cancelled {
            None
        } else {
            self.text
        }
    }
}

/// How a relay wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Answered(String),
    Cancelled,
    /// The request was unregistered or replaced before anyone answered.
    Abandoned,
    TimedOut,
}

impl RelayOutcome {
    pub fn into_answer(self) -> Option<String> {
        match self {
            Self::Answered(text) => Some(text),
            _ => None,
        }
    }
}

/// Receiving half of a registered request.
pub struct RelayTicket {
    request_id: String,
    rx: oneshot::Receiver<Option<String>>,
}

impl RelayTicket {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for delivery without a bound.
    pub async fn recv(self) -> RelayOutcome {
        match self.rx.await {
            Ok(Some(text)) => RelayOutcome::Answered(text),
            Ok(None) => RelayOutcome::Cancelled,
            Err(_) => RelayOutcome::Abandoned,
        }
    }
}

/// Registry of requests awaiting a human answer.
#[derive(Default)]
pub struct HumanRelayBridge {
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl HumanRelayBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh request id.
    pub fn new_request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Register a request and get the ticket its answer will arrive on.
    ///
    /// Re-registering an id abandons the previous registration.
    pub fn register(&self, request_id: &str, prompt: Option<&str>) -> RelayTicket {
        let (tx, rx) = oneshot::channel();
        self.insert(request_id, prompt, Slot::Waiter(tx));
        RelayTicket {
            request_id: request_id.to_string(),
            rx,
        }
    }

    /// Register a callback that runs at most once with the answer.
    pub fn register_callback<F>(&self, request_id: &str, prompt: Option<&str>, callback: F)
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        self.insert(request_id, prompt, Slot::Callback(Box::new(callback)));
    }

    fn insert(&self, request_id: &str, prompt: Option<&str>, slot: Slot) {
        let entry = PendingEntry {
            slot,
            info: PendingRelayRequest {
                request_id: request_id.to_string(),
                prompt: prompt.map(str::to_string),
                registered_at: chrono::Utc::now().to_rfc3339(),
            },
        };
        let replaced = self.pending.lock().insert(request_id.to_string(), entry);
        if replaced.is_some() {
            warn!("Relay request {} re-registered; previous waiter abandoned", request_id);
        }
        info!("Relay request pending: {}", request_id);
    }

    /// Deliver an answer. Returns `false` if nothing was waiting on the id.
    pub fn deliver(&self, request_id: &str, delivery: RelayDelivery) -> bool {
        let entry = self.pending.lock().remove(request_id);
        match entry {
            Some(entry) => {
                let cancelled = delivery.cancelled;
                // Fulfil outside the lock: callbacks may call back into the bridge.
                entry.slot.fulfil(delivery.into_value());
                info!(
                    "Relay request {} {}",
                    request_id,
                    if cancelled { "cancelled" } else { "answered" }
                );
                true
            }
            None => {
                debug!("No pending relay request {}; delivery ignored", request_id);
                false
            }
        }
    }

    /// Abandon a pending request without waiting for an answer.
    pub fn unregister(&self, request_id: &str) -> bool {
        let removed = self.pending.lock().remove(request_id).is_some();
        if removed {
            info!("Relay request {} unregistered", request_id);
        }
        removed
    }

    /// Wait on a ticket, unregistering it if `timeout` elapses first.
    pub async fn wait(&self, ticket: RelayTicket, timeout: Option<Duration>) -> RelayOutcome {
        let request_id = ticket.request_id.clone();
        match timeout {
            None => ticket.recv().await,
            Some(limit) => match tokio::time::timeout(limit, ticket.recv()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.unregister(&request_id);
                    warn!(
                        "Relay request {} unanswered after {}s",
                        request_id,
                        limit.as_secs()
                    );
                    RelayOutcome::TimedOut
                }
            },
        }
    }

    /// Outstanding requests, oldest first.
    pub fn pending(&self) -> Vec<PendingRelayRequest> {
        let mut list: Vec<PendingRelayRequest> = self
            .pending
            .lock()
            .values()
            .map(|e| e.info.clone())
            .collect();
        list.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        list
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_answer_resolves_ticket() {
        let bridge = HumanRelayBridge::new();
        let ticket = bridge.register("req-1", Some("What is 2+2?"));
        assert!(bridge.is_pending("req-1"));

        assert!(bridge.deliver("req-1", RelayDelivery::answer("answer")));
        assert_eq!(ticket.recv().await, RelayOutcome::Answered("answer".into()));
        assert!(bridge.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_resolves_with_absent_value() {
        let bridge = HumanRelayBridge::new();
        let ticket = bridge.register("req-1", None);
        assert!(bridge.deliver("req-1", RelayDelivery::cancelled()));
        let outcome = ticket.recv().await;
        assert_eq!(outcome, RelayOutcome::Cancelled);
        assert_eq!(outcome.into_answer(), None);
    }

    #[test]
    fn test_second_delivery_is_noop() {
        let bridge = HumanRelayBridge::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        bridge.register_callback("req-1", None, move |value| {
            assert_eq!(value.as_deref(), Some("first"));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bridge.deliver("req-1", RelayDelivery::answer("first")));
        assert!(!bridge.deliver("req-1", RelayDelivery::answer("second")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deliver_unknown_is_silent() {
        let bridge = HumanRelayBridge::new();
        assert!(!bridge.deliver("ghost", RelayDelivery::answer("hi")));
    }

    #[tokio::test]
    async fn test_unregister_abandons_waiter() {
        let bridge = HumanRelayBridge::new();
        let ticket = bridge.register("req-1", None);
        assert!(bridge.unregister("req-1"));
        assert!(!bridge.unregister("req-1"));
        assert_eq!(ticket.recv().await, RelayOutcome::Abandoned);
        assert!(!bridge.deliver("req-1", RelayDelivery::answer("late")));
    }

    #[tokio::test]
    async fn test_wait_times_out_and_unregisters() {
        let bridge = HumanRelayBridge::new();
        let ticket = bridge.register("req-1", None);
        let outcome = bridge.wait(ticket, Some(Duration::from_millis(20))).await;
        assert_eq!(outcome, RelayOutcome::TimedOut);
        assert!(!bridge.is_pending("req-1"));
    }

    #[tokio::test]
    async fn test_wait_receives_concurrent_delivery() {
        let bridge = Arc::new(HumanRelayBridge::new());
        let ticket = bridge.register("req-1", None);
        let deliverer = bridge.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            deliverer.deliver("req-1", RelayDelivery::answer("from a human"));
        });
        let outcome = bridge.wait(ticket, Some(Duration::from_secs(5))).await;
        assert_eq!(outcome, RelayOutcome::Answered("from a human".into()));
    }

    #[test]
    fn test_pending_listing() {
        let bridge = HumanRelayBridge::new();
        let _a = bridge.register("a", Some("first prompt"));
        let _b = bridge.register("b", None);
        let pending = bridge.pending();
        assert_eq!(pending.len(), 2);
        let json = serde_json::to_value(&pending[0]).unwrap();
        assert!(json["requestId"].is_string());
        assert!(json["registeredAt"].is_string());
    }

    #[test]
    fn test_delivery_value() {
        let delivery: RelayDelivery =
            serde_json::from_str(r#"{"text": "ignored", "cancelled": true}"#).unwrap();
        assert_eq!(delivery.into_value(), None);
        let delivery: RelayDelivery = serde_json::from_str(r#"{"text": "kept"}"#).unwrap();
        assert_eq!(delivery.into_value().as_deref(), Some("kept"));
    }
}

//! Policy-change notifications
//!
//! Every successful mutation publishes one [`PolicyEvent`] to all live
//! subscribers, so a host can invalidate its own caches. Delivery is
//! non-blocking; subscribers whose receiver was dropped are pruned on the next
//! publish.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

/// What changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PolicyEvent {
    /// Rules were added to `ptype`
    PolicyAdded { ptype: String, rules: Vec<Vec<String>> },
    /// Rules were removed from `ptype`
    PolicyRemoved { ptype: String, rules: Vec<Vec<String>> },
    /// Rules matching a filter were removed from `ptype`
    FilteredPolicyRemoved {
        ptype: String,
        field_index: usize,
        field_values: Vec<String>,
        rules: Vec<Vec<String>>,
    },
    /// All rules were reloaded from the store
    PolicyLoaded { rules: usize },
    /// All rules were written to the store
    PolicySaved { rules: usize },
    /// All rules were removed
    PolicyCleared,
}

impl PolicyEvent {
    /// Short operation name, used in log fields
    pub fn operation(&self) -> &'static str {
        match self {
            PolicyEvent::PolicyAdded { .. } => "add",
            PolicyEvent::PolicyRemoved { .. } => "remove",
            PolicyEvent::FilteredPolicyRemoved { .. } => "remove_filtered",
            PolicyEvent::PolicyLoaded { .. } => "load",
            PolicyEvent::PolicySaved { .. } => "save",
            PolicyEvent::PolicyCleared => "clear",
        }
    }

    /// JSON form, for hosts forwarding events to another process
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Fan-out of policy events to subscribers
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<PolicyEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber; it sees events published after this call
    pub fn subscribe(&self) -> Receiver<PolicyEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send `event` to every live subscriber
    pub fn publish(&self, event: PolicyEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every sender; receivers observe disconnection once drained
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }
}

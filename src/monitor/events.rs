//! Network monitoring events
//!
//! Event types and the in-process publish/subscribe bus

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::alerts::SecurityAlert;
use crate::models::Device;

/// Events published by discovery, detection and the monitor loops
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NetworkEvent {
    /// Monitoring session started
    MonitoringStarted { scan_interval_seconds: u64 },

    /// Monitoring session stopped
    MonitoringStopped,

    /// A probe found a device (new or already known)
    DeviceDiscovered { device: Device, is_new: bool },

    /// Scan session completed
    ScanCompleted {
        session_id: u64,
        hosts_probed: usize,
        hosts_found: usize,
        marked_offline: usize,
        duration_ms: u64,
    },

    /// The gateway address differs from the previous session
    NetworkChanged {
        old_gateway: Option<Ipv4Addr>,
        new_gateway: Ipv4Addr,
    },

    /// The detector raised an alert
    AlertRaised { alert: SecurityAlert },

    /// Error during monitoring
    MonitoringError { message: String },
}

/// Event callback type
pub type EventCallback = Arc<dyn Fn(NetworkEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    callbacks: Vec<EventCallback>,
    channels: Vec<mpsc::UnboundedSender<NetworkEvent>>,
}

/// Fan-out of [`NetworkEvent`]s to registered callbacks and channels.
///
/// Delivery is at-least-once per live subscriber, in publish order per
/// publisher, with no ordering across publishers and no persistence.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Callbacks run on the publishing task and must not block.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(NetworkEvent) + Send + Sync + 'static,
    {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.callbacks.push(Arc::new(callback));
        }
    }

    /// Register an unbounded channel; dropped receivers are pruned on publish
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<NetworkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.channels.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: NetworkEvent) {
        // Callbacks are invoked outside the lock so they may subscribe/publish
        let callbacks = match self.subscribers.lock() {
            Ok(mut subs) => {
                subs.channels.retain(|tx| tx.send(event.clone()).is_ok());
                subs.callbacks.clone()
            }
            Err(_) => {
                tracing::warn!("Event bus lock poisoned; dropping {}", event_name(&event));
                return;
            }
        };

        for callback in callbacks {
            callback(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.callbacks.len() + subs.channels.len())
            .unwrap_or(0)
    }
}

fn event_name(event: &NetworkEvent) -> &'static str {
    match event {
        NetworkEvent::MonitoringStarted { .. } => "MonitoringStarted",
        NetworkEvent::MonitoringStopped => "MonitoringStopped",
        NetworkEvent::DeviceDiscovered { .. } => "DeviceDiscovered",
        NetworkEvent::ScanCompleted { .. } => "ScanCompleted",
        NetworkEvent::NetworkChanged { .. } => "NetworkChanged",
        NetworkEvent::AlertRaised { .. } => "AlertRaised",
        NetworkEvent::MonitoringError { .. } => "MonitoringError",
    }
}

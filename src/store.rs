//! Persistence and alert delivery seams
//!
//! The core only talks to storage through [`DeviceStore`]. `MemoryStore` is
//! the in-process implementation used by the CLI and tests.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::alerts::SecurityAlert;
use crate::config::MonitorSettings;
use crate::models::Device;
use crate::monitor::{EventBus, NetworkEvent};

/// Device/alert persistence. Rows are keyed by hardware address.
pub trait DeviceStore: Send + Sync {
    fn upsert_device(&self, device: &Device) -> Result<()>;
    fn all_devices(&self) -> Result<Vec<Device>>;
    fn record_alert(&self, alert: &SecurityAlert) -> Result<()>;
    fn latest_settings(&self) -> Result<MonitorSettings>;
}

#[derive(Default)]
struct MemoryState {
    devices: HashMap<String, Device>,
    alerts: Vec<SecurityAlert>,
    settings: MonitorSettings,
}

/// In-memory [`DeviceStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: MonitorSettings) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                settings,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))
    }

    pub fn update_settings(&self, settings: MonitorSettings) -> Result<()> {
        self.lock()?.settings = settings;
        Ok(())
    }

    pub fn alerts(&self) -> Result<Vec<SecurityAlert>> {
        Ok(self.lock()?.alerts.clone())
    }

    pub fn unread_alerts(&self) -> Result<Vec<SecurityAlert>> {
        Ok(self
            .lock()?
            .alerts
            .iter()
            .filter(|a| !a.is_read)
            .cloned()
            .collect())
    }

    /// Sets the read flag of the alert at `index` (insertion order)
    pub fn mark_alert_read(&self, index: usize) -> Result<bool> {
        let mut state = self.lock()?;
        match state.alerts.get_mut(index) {
            Some(alert) => {
                alert.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl DeviceStore for MemoryStore {
    fn upsert_device(&self, device: &Device) -> Result<()> {
        self.lock()?
            .devices
            .insert(device.mac.clone(), device.clone());
        Ok(())
    }

    fn all_devices(&self) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = self.lock()?.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(devices)
    }

    fn record_alert(&self, alert: &SecurityAlert) -> Result<()> {
        self.lock()?.alerts.push(alert.clone());
        Ok(())
    }

    fn latest_settings(&self) -> Result<MonitorSettings> {
        Ok(self.lock()?.settings.clone())
    }
}

/// Fire-and-forget alert delivery
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: SecurityAlert);
}

/// Records each alert in the store and publishes `AlertRaised`.
/// A failing store never stops publication.
#[derive(Clone)]
pub struct AlertDispatcher {
    store: Arc<dyn DeviceStore>,
    bus: EventBus,
}

impl AlertDispatcher {
    pub fn new(store: Arc<dyn DeviceStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }
}

impl AlertSink for AlertDispatcher {
    fn raise(&self, alert: SecurityAlert) {
        tracing::warn!(
            kind = alert.kind.as_str(),
            severity = alert.severity.as_str(),
            "{}: {}",
            alert.title,
            alert.description
        );
        if let Err(e) = self.store.record_alert(&alert) {
            tracing::warn!("Failed to record alert: {:#}", e);
        }
        self.bus.publish(NetworkEvent::AlertRaised { alert });
    }
}

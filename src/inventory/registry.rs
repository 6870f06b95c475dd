//! Device registry keyed by hardware address
//!
//! All device state sits behind one mutex; readers get point-in-time copies.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{Device, DiscoveredHost, NetworkInterfaceSnapshot};
use crate::network::in_same_subnet;
use crate::store::DeviceStore;

#[derive(Debug, Default)]
struct RegistryState {
    devices: HashMap<String, Device>,
    last_gateway: Option<Ipv4Addr>,
}

/// Result of merging one discovery
#[derive(Debug, Clone)]
pub struct RecordedDevice {
    pub device: Device,
    pub is_new: bool,
}

pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
    store: Option<Arc<dyn DeviceStore>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DeviceRegistry {
    pub fn new(store: Option<Arc<dyn DeviceStore>>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            store,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Device registry lock poisoned"))
    }

    /// Writes devices through to the store; failures are logged only
    fn persist(&self, devices: &[Device]) {
        let Some(store) = &self.store else {
            return;
        };
        for device in devices {
            if let Err(e) = store.upsert_device(device) {
                tracing::warn!("Failed to persist device {}: {:#}", device.mac, e);
            }
        }
    }

    /// Seeds the registry from the store. Rows already in memory win; stale
    /// online flags are cleared by the next session's absence marking.
    pub fn load_from_store(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let devices = store.all_devices()?;
        let mut state = self.lock()?;
        for device in devices {
            state
                .devices
                .entry(device.mac.clone())
                .or_insert(device);
        }
        Ok(state.devices.len())
    }

    pub fn last_gateway(&self) -> Result<Option<Ipv4Addr>> {
        Ok(self.lock()?.last_gateway)
    }

    /// Records the gateway of the session now starting. Returns the previous
    /// gateway when it differs (a network change); the first session has none.
    pub fn observe_gateway(&self, gateway: Ipv4Addr) -> Result<Option<Ipv4Addr>> {
        let mut state = self.lock()?;
        let previous = state.last_gateway.replace(gateway);
        Ok(previous.filter(|old| *old != gateway))
    }

    /// Merges a validated probe result. The hardware address is the identity:
    /// a known MAC on a new IP updates the existing row.
    pub fn record_discovery(
        &self,
        host: &DiscoveredHost,
        seen_at: DateTime<Utc>,
    ) -> Result<RecordedDevice> {
        let recorded = {
            let mut state = self.lock()?;
            match state.devices.get_mut(&host.mac) {
                Some(device) => {
                    if device.ip != host.ip {
                        tracing::info!("{} moved {} -> {}", device.mac, device.ip, host.ip);
                    }
                    device.apply_discovery(host, seen_at);
                    RecordedDevice {
                        device: device.clone(),
                        is_new: false,
                    }
                }
                None => {
                    let device = Device::from_discovery(host, seen_at);
                    state.devices.insert(device.mac.clone(), device.clone());
                    RecordedDevice {
                        device,
                        is_new: true,
                    }
                }
            }
        };

        self.persist(std::slice::from_ref(&recorded.device));
        Ok(recorded)
    }

    /// Marks online devices missing from `discovered` offline at `at`.
    /// Idempotent; returns the devices that changed.
    pub fn mark_absent(&self, discovered: &HashSet<String>, at: DateTime<Utc>) -> Result<Vec<Device>> {
        let changed: Vec<Device> = {
            let mut state = self.lock()?;
            state
                .devices
                .values_mut()
                .filter(|d| !discovered.contains(&d.mac))
                .filter_map(|d| d.mark_offline(at).then(|| d.clone()))
                .collect()
        };
        self.persist(&changed);
        Ok(changed)
    }

    /// Marks every device offline in one critical section (network change)
    pub fn mark_all_offline(&self, at: DateTime<Utc>) -> Result<Vec<Device>> {
        self.mark_absent(&HashSet::new(), at)
    }

    pub fn get(&self, mac: &str) -> Result<Option<Device>> {
        Ok(self.lock()?.devices.get(&mac.to_ascii_lowercase()).cloned())
    }

    /// Every device ever seen, sorted by IP
    pub fn snapshot(&self) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = self.lock()?.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(devices)
    }

    pub fn online_devices(&self) -> Result<Vec<Device>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|d| d.is_online)
            .collect())
    }

    /// Devices whose IP lies in the subnet of `interface`. Rows from other
    /// networks stay in the registry but are not returned.
    pub fn known_devices(&self, interface: &NetworkInterfaceSnapshot) -> Result<Vec<Device>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|d| in_same_subnet(d.ip, interface.address, interface.subnet_mask))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.devices.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DeviceClass;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn host(mac: &str, ip: [u8; 4]) -> DiscoveredHost {
        DiscoveredHost {
            ip: Ipv4Addr::from(ip),
            mac: mac.to_string(),
            vendor: None,
            hostname: None,
            is_gateway: false,
            is_randomized: false,
            device_class: DeviceClass::Unknown,
        }
    }

    fn snapshot(address: [u8; 4]) -> NetworkInterfaceSnapshot {
        NetworkInterfaceSnapshot {
            name: "wlan0".to_string(),
            address: Ipv4Addr::from(address),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(address[0], address[1], address[2], 1),
            wireless_network: None,
            mac: "02:00:00:00:00:aa".to_string(),
        }
    }

    #[test]
    fn ip_reuse_keeps_one_row_per_mac() {
        let registry = DeviceRegistry::default();
        let t0 = Utc::now();

        assert!(registry.record_discovery(&host("aa:00:00:00:00:01", [192, 168, 1, 10]), t0).unwrap().is_new);
        let again = registry
            .record_discovery(&host("aa:00:00:00:00:01", [192, 168, 1, 77]), t0 + Duration::seconds(60))
            .unwrap();

        assert!(!again.is_new);
        assert_eq!(registry.len(), 1);
        assert_eq!(again.device.ip, Ipv4Addr::new(192, 168, 1, 77));
    }

    #[test]
    fn absence_marking_is_idempotent() {
        let registry = DeviceRegistry::default();
        let t0 = Utc::now();
        registry.record_discovery(&host("aa:00:00:00:00:01", [192, 168, 1, 10]), t0).unwrap();
        registry.record_discovery(&host("aa:00:00:00:00:02", [192, 168, 1, 11]), t0).unwrap();

        let present = HashSet::from(["aa:00:00:00:00:02".to_string()]);
        let t1 = t0 + Duration::seconds(30);
        assert_eq!(registry.mark_absent(&present, t1).unwrap().len(), 1);
        assert!(registry.mark_absent(&present, t1 + Duration::seconds(30)).unwrap().is_empty());

        let gone = registry.get("aa:00:00:00:00:01").unwrap().unwrap();
        assert!(!gone.is_online);
        assert_eq!(gone.offline_since, Some(t1));
    }

    #[test]
    fn known_devices_are_filtered_to_current_subnet() {
        let registry = DeviceRegistry::default();
        let t0 = Utc::now();
        registry.record_discovery(&host("aa:00:00:00:00:01", [192, 168, 1, 10]), t0).unwrap();
        registry.record_discovery(&host("aa:00:00:00:00:02", [192, 168, 43, 5]), t0).unwrap();

        let home = registry.known_devices(&snapshot([192, 168, 1, 20])).unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].mac, "aa:00:00:00:00:01");
        assert_eq!(registry.snapshot().unwrap().len(), 2);
    }

    #[test]
    fn gateway_change_is_reported_once() {
        let registry = DeviceRegistry::default();
        let home = Ipv4Addr::new(192, 168, 1, 1);
        let hotspot = Ipv4Addr::new(192, 168, 43, 1);

        assert_eq!(registry.observe_gateway(home).unwrap(), None);
        assert_eq!(registry.observe_gateway(home).unwrap(), None);
        assert_eq!(registry.observe_gateway(hotspot).unwrap(), Some(home));
        assert_eq!(registry.last_gateway().unwrap(), Some(hotspot));
    }

    #[test]
    fn writes_through_and_reloads_from_store() {
        let store = Arc::new(MemoryStore::new());
        let registry = DeviceRegistry::new(Some(store.clone()));
        registry
            .record_discovery(&host("aa:00:00:00:00:01", [192, 168, 1, 10]), Utc::now())
            .unwrap();
        assert_eq!(store.all_devices().unwrap().len(), 1);

        let reloaded = DeviceRegistry::new(Some(store));
        assert_eq!(reloaded.load_from_store().unwrap(), 1);
        assert!(reloaded.get("AA:00:00:00:00:01").unwrap().is_some());
    }
}

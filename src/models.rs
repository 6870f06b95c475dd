//! Data models shared across discovery, registry and detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::network::DeviceClass;

/// The active interface as captured at one point in time.
///
/// Replaced wholesale when the active interface changes; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceSnapshot {
    pub name: String,
    pub address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wireless_network: Option<String>,
    pub mac: String,
}

impl NetworkInterfaceSnapshot {
    /// Two snapshots describe the same network attachment when address,
    /// mask and gateway agree.
    pub fn same_attachment(&self, other: &NetworkInterfaceSnapshot) -> bool {
        self.address == other.address
            && self.subnet_mask == other.subnet_mask
            && self.gateway == other.gateway
    }
}

/// A device known to the registry. The hardware address is the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Lowercase, colon-separated hardware address
    pub mac: String,
    pub ip: Ipv4Addr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Set when the device was last marked offline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_since: Option<DateTime<Utc>>,
    pub is_online: bool,
    pub is_gateway: bool,
    /// True if the MAC is locally administered (randomized/virtual)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_randomized: bool,
    pub device_class: DeviceClass,
}

/// A validated probe result, ready to be merged into the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredHost {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub vendor: Option<String>,
    pub hostname: Option<String>,
    pub is_gateway: bool,
    pub is_randomized: bool,
    pub device_class: DeviceClass,
}

impl Device {
    /// First sighting of a hardware address
    pub fn from_discovery(host: &DiscoveredHost, seen_at: DateTime<Utc>) -> Self {
        Self {
            mac: host.mac.clone(),
            ip: host.ip,
            vendor: host.vendor.clone(),
            hostname: host.hostname.clone(),
            first_seen: seen_at,
            last_seen: seen_at,
            offline_since: None,
            is_online: true,
            is_gateway: host.is_gateway,
            is_randomized: host.is_randomized,
            device_class: host.device_class,
        }
    }

    /// Later sighting: IP, names and class follow the newest probe; a failed
    /// name lookup keeps the previously resolved name.
    pub fn apply_discovery(&mut self, host: &DiscoveredHost, seen_at: DateTime<Utc>) {
        self.ip = host.ip;
        if host.vendor.is_some() {
            self.vendor = host.vendor.clone();
        }
        if host.hostname.is_some() {
            self.hostname = host.hostname.clone();
        }
        self.is_gateway = host.is_gateway;
        self.is_randomized = host.is_randomized;
        self.device_class = host.device_class;
        if seen_at > self.last_seen {
            self.last_seen = seen_at;
        }
        self.is_online = true;
        self.offline_since = None;
    }

    /// Marks the device offline at `at`, never earlier than `last_seen`.
    /// Returns false if the device was already offline.
    pub fn mark_offline(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_online {
            return false;
        }
        self.is_online = false;
        self.offline_since = Some(at.max(self.last_seen));
        true
    }
}

/// Latest connection counts published by the connection feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub total: u64,
    pub established: u64,
    pub tcp: u64,
    pub udp: u64,
}

/// Latest throughput published by the bandwidth feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    pub upload_kbps: f64,
    pub download_kbps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn host(ip: &str, hostname: Option<&str>) -> DiscoveredHost {
        DiscoveredHost {
            ip: ip.parse().unwrap(),
            mac: "aa:bb:cc:00:00:01".to_string(),
            vendor: None,
            hostname: hostname.map(str::to_string),
            is_gateway: false,
            is_randomized: false,
            device_class: DeviceClass::Unknown,
        }
    }

    #[test]
    fn rediscovery_updates_ip_and_keeps_known_hostname() {
        let t0 = Utc::now();
        let mut device = Device::from_discovery(&host("192.168.1.20", Some("nas")), t0);
        device.apply_discovery(&host("192.168.1.21", None), t0 + Duration::seconds(30));

        assert_eq!(device.ip, "192.168.1.21".parse::<Ipv4Addr>().unwrap());
        assert_eq!(device.hostname.as_deref(), Some("nas"));
        assert_eq!(device.first_seen, t0);
    }

    #[test]
    fn offline_timestamp_never_precedes_last_seen() {
        let t0 = Utc::now();
        let mut device = Device::from_discovery(&host("192.168.1.20", None), t0);

        assert!(device.mark_offline(t0 - Duration::seconds(10)));
        assert_eq!(device.offline_since, Some(t0));
        assert!(!device.mark_offline(t0 + Duration::seconds(10)));
        assert_eq!(device.offline_since, Some(t0));
    }
}

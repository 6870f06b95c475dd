//! Unknown-device and hotspot device-limit detection

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::hotspot::NetworkMode;
use super::types::{AlertKind, SecurityAlert};
use crate::models::Device;

/// Remembers every hardware address ever seen online
#[derive(Debug, Clone, Default)]
pub struct UnknownDeviceTracker {
    seen: HashSet<String>,
}

impl UnknownDeviceTracker {
    /// Starts from the addresses already known to the store
    pub fn with_known<I, S>(macs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            seen: macs
                .into_iter()
                .map(|mac| mac.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_known(&self, mac: &str) -> bool {
        self.seen.contains(&mac.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Returns one alert per online device whose address was never seen.
    /// Addresses are remembered immediately, so each alerts exactly once.
    pub fn evaluate(&mut self, online: &[Device], now: DateTime<Utc>) -> Vec<SecurityAlert> {
        let mut alerts = Vec::new();

        for device in online.iter().filter(|d| d.is_online) {
            if !self.seen.insert(device.mac.to_ascii_lowercase()) {
                continue;
            }

            let name = device
                .hostname
                .as_deref()
                .or(device.vendor.as_deref())
                .unwrap_or("Unknown");
            alerts.push(
                SecurityAlert::new(
                    AlertKind::UnknownDevice,
                    "Unknown device joined the network",
                    format!(
                        "New device {} ({}) at {} is {}",
                        device.mac,
                        name,
                        device.ip,
                        device.device_class.as_str()
                    ),
                    now,
                )
                .with_source(device.ip.to_string(), device.mac.clone()),
            );
        }

        alerts
    }
}

/// One warning per evaluation while a hotspot carries more devices than expected
pub fn hotspot_limit_alert(
    mode: NetworkMode,
    online_count: usize,
    expected_max: usize,
    now: DateTime<Utc>,
) -> Option<SecurityAlert> {
    if !mode.is_hotspot() || online_count <= expected_max {
        return None;
    }

    Some(SecurityAlert::new(
        AlertKind::HotspotDeviceLimit,
        "Too many devices on hotspot",
        format!(
            "{} devices are online on this hotspot; at most {} are expected",
            online_count, expected_max
        ),
        now,
    ))
}

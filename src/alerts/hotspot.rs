//! Network mode inference (fixed LAN vs. mobile hotspot)

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// How sensitive the detector should be on the active network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Normal,
    Hotspot,
}

impl NetworkMode {
    pub fn is_hotspot(&self) -> bool {
        matches!(self, NetworkMode::Hotspot)
    }
}

/// Infers the network mode from the gateway address. Approximate by nature;
/// swap the implementation to change the heuristic.
pub trait NetworkModeClassifier: Send + Sync {
    fn classify(&self, gateway: Ipv4Addr) -> NetworkMode;
}

/// Treats gateways inside well-known tethering ranges as hotspots
#[derive(Debug, Clone)]
pub struct HotspotSubnetClassifier {
    ranges: Vec<Ipv4Network>,
}

impl Default for HotspotSubnetClassifier {
    fn default() -> Self {
        Self {
            ranges: vec![
                // Windows mobile hotspot / many carrier routers
                Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), 8),
                // iOS personal hotspot
                Ipv4Network::new(Ipv4Addr::new(172, 20, 0, 0), 16),
                // Android tethering
                Ipv4Network::new(Ipv4Addr::new(192, 168, 43, 0), 24),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }
}

impl HotspotSubnetClassifier {
    pub fn with_ranges(ranges: Vec<Ipv4Network>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[Ipv4Network] {
        &self.ranges
    }
}

impl NetworkModeClassifier for HotspotSubnetClassifier {
    fn classify(&self, gateway: Ipv4Addr) -> NetworkMode {
        if self.ranges.iter().any(|range| range.contains(gateway)) {
            NetworkMode::Hotspot
        } else {
            NetworkMode::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_tethering_ranges() {
        let classifier = HotspotSubnetClassifier::default();
        assert_eq!(classifier.ranges().len(), 3);

        for gateway in [
            Ipv4Addr::new(192, 168, 43, 1),
            Ipv4Addr::new(172, 20, 10, 1),
            Ipv4Addr::new(10, 0, 0, 1),
        ] {
            assert_eq!(classifier.classify(gateway), NetworkMode::Hotspot, "{gateway}");
        }

        for gateway in [
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(172, 16, 0, 1),
            Ipv4Addr::new(192, 168, 44, 1),
        ] {
            assert_eq!(classifier.classify(gateway), NetworkMode::Normal, "{gateway}");
        }
    }
}

use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use lanwatch::alerts::HotspotSubnetClassifier;
use lanwatch::network::{
    DeviceClass, FixedInterfaceProvider, NeighborEntry, NeighborKind, parse_mac,
};
use lanwatch::{
    AlertKind, AlertSeverity, ConnectionStats, DetectorInputs, DeviceRegistry, DeviceStore,
    DiscoveredHost, EventBus, FeedHub, MemoryStore, NeighborTable, NetworkEvent,
    NetworkInterfaceSnapshot, AlertDispatcher, SecurityDetector,
};

/// Neighbor table holding just the gateway row
struct GatewayRow {
    gateway: Mutex<(Ipv4Addr, String)>,
}

impl GatewayRow {
    fn new(ip: Ipv4Addr, mac: &str) -> Self {
        Self {
            gateway: Mutex::new((ip, mac.to_string())),
        }
    }

    fn set(&self, ip: Ipv4Addr, mac: &str) {
        *self.gateway.lock().expect("gateway lock") = (ip, mac.to_string());
    }
}

impl NeighborTable for GatewayRow {
    fn entries(&self) -> anyhow::Result<Vec<NeighborEntry>> {
        let (ip, mac) = self.gateway.lock().expect("gateway lock").clone();
        Ok(vec![NeighborEntry {
            ip,
            mac: parse_mac(&mac),
            kind: NeighborKind::Dynamic,
        }])
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
}

fn interface(network: [u8; 3]) -> NetworkInterfaceSnapshot {
    NetworkInterfaceSnapshot {
        name: "wlan0".to_string(),
        address: Ipv4Addr::new(network[0], network[1], network[2], 100),
        subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::new(network[0], network[1], network[2], 1),
        wireless_network: Some("lab".to_string()),
        mac: "02:00:00:00:00:64".to_string(),
    }
}

struct Setup {
    detector: SecurityDetector,
    interfaces: Arc<FixedInterfaceProvider>,
    neighbors: Arc<GatewayRow>,
    registry: Arc<DeviceRegistry>,
    hub: FeedHub,
    store: Arc<MemoryStore>,
    bus: EventBus,
}

fn setup(network: [u8; 3], gateway_mac: &str) -> Setup {
    let snapshot = interface(network);
    let interfaces = Arc::new(FixedInterfaceProvider::new(Some(snapshot.clone())));
    let neighbors = Arc::new(GatewayRow::new(snapshot.gateway, gateway_mac));
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(DeviceRegistry::new(Some(store.clone())));
    let hub = FeedHub::new();
    let bus = EventBus::new();

    let detector = SecurityDetector::new(DetectorInputs {
        interfaces: interfaces.clone(),
        neighbors: neighbors.clone(),
        registry: registry.clone(),
        connections: Arc::new(hub.clone()),
        bandwidth: Arc::new(hub.clone()),
        store: store.clone(),
        sink: Arc::new(AlertDispatcher::new(store.clone(), bus.clone())),
        modes: Arc::new(HotspotSubnetClassifier::default()),
    });

    Setup {
        detector,
        interfaces,
        neighbors,
        registry,
        hub,
        store,
        bus,
    }
}

fn discover(registry: &DeviceRegistry, ip: Ipv4Addr, mac: &str, seen_at: DateTime<Utc>) {
    registry
        .record_discovery(
            &DiscoveredHost {
                ip,
                mac: mac.to_string(),
                vendor: None,
                hostname: None,
                is_gateway: false,
                is_randomized: false,
                device_class: DeviceClass::Unknown,
            },
            seen_at,
        )
        .expect("record discovery");
}

fn count(alerts: &[lanwatch::SecurityAlert], kind: AlertKind) -> usize {
    alerts.iter().filter(|a| a.kind == kind).count()
}

#[test]
fn gateway_spoof_raises_one_critical_alert_and_reaches_subscribers() {
    let s = setup([192, 168, 1], "aa:aa:aa:aa:aa:aa");
    let mut events = s.bus.subscribe_channel();

    s.detector.tick(at(0)).unwrap();
    s.neighbors
        .set(Ipv4Addr::new(192, 168, 1, 1), "bb:bb:bb:bb:bb:bb");

    let mut spoofs = Vec::new();
    for t in (5..=60).step_by(5) {
        for alert in s.detector.tick(at(t)).unwrap() {
            if alert.kind == AlertKind::GatewaySpoof {
                spoofs.push((t, alert));
            }
        }
    }

    assert_eq!(spoofs.len(), 1);
    assert_eq!(spoofs[0].0, 25);
    assert_eq!(spoofs[0].1.severity, AlertSeverity::Critical);
    assert_eq!(
        s.detector.gateway_state().unwrap().baseline.as_deref(),
        Some("bb:bb:bb:bb:bb:bb")
    );

    let recorded = s.store.alerts().unwrap();
    assert_eq!(count(&recorded, AlertKind::GatewaySpoof), 1);

    let mut published = 0;
    while let Ok(event) = events.try_recv() {
        if let NetworkEvent::AlertRaised { alert } = event
            && alert.kind == AlertKind::GatewaySpoof
        {
            published += 1;
        }
    }
    assert_eq!(published, 1);
}

#[test]
fn interface_switch_suppresses_gateway_alerts_during_grace() {
    let s = setup([192, 168, 1], "aa:aa:aa:aa:aa:aa");
    s.detector.tick(at(0)).unwrap();

    // Move to another LAN whose router has a different MAC
    let office = interface([192, 168, 7]);
    s.interfaces.set(Some(office.clone()));
    s.neighbors.set(office.gateway, "cc:cc:cc:cc:cc:cc");

    let mut alerts = Vec::new();
    for t in (5..=120).step_by(5) {
        alerts.extend(s.detector.tick(at(t)).unwrap());
    }

    assert_eq!(count(&alerts, AlertKind::GatewaySpoof), 0);
    assert_eq!(
        s.detector.gateway_state().unwrap().baseline.as_deref(),
        Some("cc:cc:cc:cc:cc:cc")
    );
}

#[test]
fn hotspot_with_five_devices_warns_once_per_cycle() {
    let s = setup([192, 168, 43], "de:ad:be:ef:00:01");
    for i in 0..5u8 {
        discover(
            &s.registry,
            Ipv4Addr::new(192, 168, 43, 10 + i),
            &format!("3c:22:fb:00:00:{:02x}", i),
            at(0),
        );
    }

    let mut per_cycle = Vec::new();
    let mut unknown_total = 0;
    for t in (0..=90).step_by(5) {
        s.hub.publish_stats(ConnectionStats {
            total: if t >= 50 { 500 } else { 10 },
            ..Default::default()
        });
        let alerts = s.detector.tick(at(t)).unwrap();
        unknown_total += count(&alerts, AlertKind::UnknownDevice);
        if t % 30 == 0 {
            per_cycle.push(count(&alerts, AlertKind::HotspotDeviceLimit));
        } else {
            assert_eq!(count(&alerts, AlertKind::HotspotDeviceLimit), 0, "t={t}");
        }
    }

    // Unknown-device rule runs at 0, 30, 60 and 90
    assert_eq!(per_cycle, vec![1, 1, 1, 1]);
    assert_eq!(unknown_total, 5);

    let limit = s
        .store
        .alerts()
        .unwrap()
        .into_iter()
        .find(|a| a.kind == AlertKind::HotspotDeviceLimit)
        .unwrap();
    assert_eq!(limit.severity, AlertSeverity::Warning);
    assert!(limit.description.contains('5'));
}

#[test]
fn known_devices_from_store_do_not_alert() {
    let store = Arc::new(MemoryStore::new());
    let seed = DeviceRegistry::new(Some(store.clone()));
    discover(&seed, Ipv4Addr::new(192, 168, 1, 10), "3c:22:fb:00:00:01", at(0));
    assert_eq!(store.all_devices().unwrap().len(), 1);

    let registry = Arc::new(DeviceRegistry::new(Some(store.clone())));
    registry.load_from_store().unwrap();

    let hub = FeedHub::new();
    let detector = SecurityDetector::new(DetectorInputs {
        interfaces: Arc::new(FixedInterfaceProvider::new(Some(interface([192, 168, 1])))),
        neighbors: Arc::new(GatewayRow::new(
            Ipv4Addr::new(192, 168, 1, 1),
            "aa:aa:aa:aa:aa:aa",
        )),
        registry: registry.clone(),
        connections: Arc::new(hub.clone()),
        bandwidth: Arc::new(hub),
        store: store.clone(),
        sink: Arc::new(AlertDispatcher::new(store.clone(), EventBus::new())),
        modes: Arc::new(HotspotSubnetClassifier::default()),
    });

    // Devices appear only after the detector has seeded its baseline
    discover(&registry, Ipv4Addr::new(192, 168, 1, 10), "3c:22:fb:00:00:01", at(1));
    discover(&registry, Ipv4Addr::new(192, 168, 1, 11), "3c:22:fb:00:00:02", at(1));

    let alerts = detector.tick(at(2)).unwrap();
    let unknown: Vec<_> = alerts
        .iter()
        .filter(|a| a.kind == AlertKind::UnknownDevice)
        .collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].source_mac.as_deref(), Some("3c:22:fb:00:00:02"));
}

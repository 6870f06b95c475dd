use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanwatch::network::{
    FixedInterfaceProvider, HeuristicClassifier, NeighborEntry, NeighborKind, parse_mac,
};
use lanwatch::scanner::ProbeFuture;
use lanwatch::{
    DeviceRegistry, EventBus, HostProber, NameResolver, NeighborTable, NetworkEvent,
    NetworkInterfaceSnapshot, ProberConfig, ReachabilityProbe, ScanOrchestrator, Shutdown,
};

/// Simulated LAN: which addresses answer and what the neighbor table says
#[derive(Default)]
struct FakeLan {
    hosts: Mutex<HashMap<Ipv4Addr, String>>,
}

impl FakeLan {
    fn set(&self, hosts: &[(Ipv4Addr, &str)]) {
        let mut map = self.hosts.lock().expect("fake lan lock");
        map.clear();
        for (ip, mac) in hosts {
            map.insert(*ip, mac.to_string());
        }
    }
}

struct LanProbe(Arc<FakeLan>);

impl ReachabilityProbe for LanProbe {
    fn is_reachable(&self, ip: Ipv4Addr, _timeout: Duration) -> ProbeFuture<'_> {
        let alive = self.0.hosts.lock().expect("fake lan lock").contains_key(&ip);
        Box::pin(async move { alive })
    }
}

struct LanNeighbors(Arc<FakeLan>);

impl NeighborTable for LanNeighbors {
    fn entries(&self) -> anyhow::Result<Vec<NeighborEntry>> {
        Ok(self
            .0
            .hosts
            .lock()
            .expect("fake lan lock")
            .iter()
            .map(|(ip, mac)| NeighborEntry {
                ip: *ip,
                mac: parse_mac(mac),
                kind: NeighborKind::Dynamic,
            })
            .collect())
    }
}

struct NoNames;

impl NameResolver for NoNames {
    fn resolve(&self, _ip: Ipv4Addr) -> Option<String> {
        None
    }
}

fn snapshot(network: [u8; 3], mask: Ipv4Addr) -> NetworkInterfaceSnapshot {
    NetworkInterfaceSnapshot {
        name: "wlan0".to_string(),
        address: Ipv4Addr::new(network[0], network[1], network[2], 100),
        subnet_mask: mask,
        gateway: Ipv4Addr::new(network[0], network[1], network[2], 1),
        wireless_network: None,
        mac: "02:00:00:00:00:64".to_string(),
    }
}

fn home() -> NetworkInterfaceSnapshot {
    snapshot([192, 168, 1], Ipv4Addr::new(255, 255, 255, 0))
}

fn hotspot() -> NetworkInterfaceSnapshot {
    snapshot([192, 168, 43], Ipv4Addr::new(255, 255, 255, 0))
}

struct Harness {
    lan: Arc<FakeLan>,
    interfaces: Arc<FixedInterfaceProvider>,
    registry: Arc<DeviceRegistry>,
    bus: EventBus,
    orchestrator: ScanOrchestrator,
}

fn harness() -> Harness {
    let lan = Arc::new(FakeLan::default());
    let interfaces = Arc::new(FixedInterfaceProvider::new(Some(home())));
    let registry = Arc::new(DeviceRegistry::default());
    let bus = EventBus::new();

    let prober = HostProber::new(
        Arc::new(LanProbe(Arc::clone(&lan))),
        Arc::new(LanNeighbors(Arc::clone(&lan))),
        Arc::new(NoNames),
        Arc::new(HeuristicClassifier::default()),
        ProberConfig {
            max_in_flight: 16,
            probe_timeout: Duration::from_millis(50),
            settle_delay: Duration::ZERO,
            dns_timeout: Duration::from_millis(50),
        },
    );
    let orchestrator = ScanOrchestrator::new(
        interfaces.clone(),
        prober,
        Arc::clone(&registry),
        bus.clone(),
    );

    Harness {
        lan,
        interfaces,
        registry,
        bus,
        orchestrator,
    }
}

const MAC_A: &str = "3c:22:fb:00:00:0a";
const MAC_B: &str = "3c:22:fb:00:00:0b";
const MAC_GW: &str = "a4:91:b1:00:00:01";

#[tokio::test]
async fn dhcp_reassignment_updates_existing_row() {
    let h = harness();
    h.lan.set(&[(Ipv4Addr::new(192, 168, 1, 10), MAC_A)]);
    h.orchestrator.run_session(&Shutdown::new()).await.unwrap();

    h.lan.set(&[(Ipv4Addr::new(192, 168, 1, 20), MAC_A)]);
    let report = h.orchestrator.run_session(&Shutdown::new()).await.unwrap();

    assert_eq!(report.discovered.len(), 1);
    assert!(report.marked_offline.is_empty());
    assert_eq!(h.registry.len(), 1);
    let device = h.registry.get(MAC_A).unwrap().unwrap();
    assert_eq!(device.ip, Ipv4Addr::new(192, 168, 1, 20));
    assert!(device.is_online);
}

#[tokio::test]
async fn absent_devices_go_offline_at_session_time() {
    let h = harness();
    h.lan.set(&[
        (Ipv4Addr::new(192, 168, 1, 1), MAC_GW),
        (Ipv4Addr::new(192, 168, 1, 10), MAC_A),
        (Ipv4Addr::new(192, 168, 1, 11), MAC_B),
    ]);
    let first = h.orchestrator.run_session(&Shutdown::new()).await.unwrap();
    assert_eq!(first.discovered.len(), 3);
    assert_eq!(first.session.targets, 253);

    let gateway = h.registry.get(MAC_GW).unwrap().unwrap();
    assert!(gateway.is_gateway);

    h.lan.set(&[
        (Ipv4Addr::new(192, 168, 1, 1), MAC_GW),
        (Ipv4Addr::new(192, 168, 1, 10), MAC_A),
    ]);
    let second = h.orchestrator.run_session(&Shutdown::new()).await.unwrap();
    assert_eq!(second.marked_offline, vec![MAC_B.to_string()]);

    let gone = h.registry.get(MAC_B).unwrap().unwrap();
    assert!(!gone.is_online);
    let offline_since = gone.offline_since.unwrap();
    assert_eq!(offline_since, second.session.started_at.max(gone.last_seen));
    assert!(offline_since >= gone.last_seen);

    // Re-running the marker leaves the offline timestamp alone
    let third = h.orchestrator.run_session(&Shutdown::new()).await.unwrap();
    assert!(third.marked_offline.is_empty());
    assert_eq!(h.registry.get(MAC_B).unwrap().unwrap().offline_since, Some(offline_since));
}

#[tokio::test]
async fn network_change_clears_devices_before_probing() {
    let h = harness();
    h.lan.set(&[(Ipv4Addr::new(192, 168, 1, 10), MAC_A)]);
    h.orchestrator.run_session(&Shutdown::new()).await.unwrap();

    let mut events = h.bus.subscribe_channel();
    h.interfaces.set(Some(hotspot()));
    h.lan.set(&[(Ipv4Addr::new(192, 168, 43, 7), MAC_B)]);
    let report = h.orchestrator.run_session(&Shutdown::new()).await.unwrap();

    let change = report.network_change.expect("gateway changed");
    assert_eq!(change.old_gateway, Ipv4Addr::new(192, 168, 1, 1));
    assert_eq!(change.new_gateway, Ipv4Addr::new(192, 168, 43, 1));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(NetworkEvent::NetworkChanged { .. })));
    assert!(matches!(seen.last(), Some(NetworkEvent::ScanCompleted { .. })));

    assert!(!h.registry.get(MAC_A).unwrap().unwrap().is_online);

    let visible: HashSet<String> = h
        .registry
        .known_devices(&hotspot())
        .unwrap()
        .into_iter()
        .map(|d| d.mac)
        .collect();
    assert_eq!(visible, HashSet::from([MAC_B.to_string()]));
    assert_eq!(h.registry.len(), 2);
}

#[tokio::test]
async fn bad_subnet_mask_fails_the_session() {
    let h = harness();
    h.interfaces
        .set(Some(snapshot([192, 168, 1], Ipv4Addr::new(255, 0, 255, 0))));

    let err = h.orchestrator.run_session(&Shutdown::new()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("not contiguous"));
}

#[tokio::test]
async fn missing_interface_fails_the_session() {
    let h = harness();
    h.interfaces.set(None);
    assert!(h.orchestrator.run_session(&Shutdown::new()).await.is_err());
}

#[tokio::test]
async fn cancelled_session_does_not_mark_absentees() {
    let h = harness();
    h.lan.set(&[(Ipv4Addr::new(192, 168, 1, 10), MAC_A)]);
    h.orchestrator.run_session(&Shutdown::new()).await.unwrap();

    let shutdown = Shutdown::new();
    shutdown.cancel();
    assert!(h.orchestrator.run_session(&shutdown).await.is_err());
    assert!(h.registry.get(MAC_A).unwrap().unwrap().is_online);
}

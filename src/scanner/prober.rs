//! Bounded-concurrency host probing
//!
//! Each candidate address goes through reachability, a short settle delay,
//! neighbor-table validation, best-effort name resolution and
//! classification. At most `max_in_flight` addresses are worked on at once.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::icmp::ReachabilityProbe;
use crate::config;
use crate::models::DiscoveredHost;
use crate::network::{
    DeviceClassifier, NameResolver, NeighborTable, lookup_vendor_info, validate_neighbor_entry,
};
use crate::shutdown::Shutdown;

/// Prober tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProberConfig {
    pub max_in_flight: usize,
    pub probe_timeout: Duration,
    pub settle_delay: Duration,
    pub dns_timeout: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            max_in_flight: config::MAX_IN_FLIGHT_PROBES,
            probe_timeout: config::PROBE_TIMEOUT,
            settle_delay: config::NEIGHBOR_SETTLE_DELAY,
            dns_timeout: config::DNS_TIMEOUT,
        }
    }
}

impl ProberConfig {
    pub fn from_env() -> Self {
        Self {
            max_in_flight: config::max_in_flight_probes(),
            probe_timeout: config::probe_timeout(),
            settle_delay: config::neighbor_settle_delay(),
            dns_timeout: config::dns_timeout(),
        }
    }
}

/// Per-address result of a probe sweep
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub ip: Ipv4Addr,
    pub host: Option<DiscoveredHost>,
}

impl ProbeOutcome {
    pub fn discovered(&self) -> bool {
        self.host.is_some()
    }
}

struct ProberInner {
    probe: Arc<dyn ReachabilityProbe>,
    neighbors: Arc<dyn NeighborTable>,
    resolver: Arc<dyn NameResolver>,
    classifier: Arc<dyn DeviceClassifier>,
    config: ProberConfig,
}

/// Fans probes out over a counting semaphore and gathers every result
#[derive(Clone)]
pub struct HostProber {
    inner: Arc<ProberInner>,
}

impl HostProber {
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        neighbors: Arc<dyn NeighborTable>,
        resolver: Arc<dyn NameResolver>,
        classifier: Arc<dyn DeviceClassifier>,
        config: ProberConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ProberInner {
                probe,
                neighbors,
                resolver,
                classifier,
                config,
            }),
        }
    }

    pub fn config(&self) -> ProberConfig {
        self.inner.config
    }

    /// Probes every target and returns only after all probes finished.
    ///
    /// After cancellation no new probe starts; probes already past the
    /// semaphore run to completion. Unstarted targets report "not discovered".
    pub async fn probe_all(
        &self,
        targets: &[Ipv4Addr],
        gateway: Ipv4Addr,
        shutdown: &Shutdown,
    ) -> Vec<ProbeOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_in_flight.max(1)));
        let mut handles = Vec::with_capacity(targets.len());

        for &ip in targets {
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            let shutdown = shutdown.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(e) => {
                            tracing::warn!("Probe semaphore acquire failed for {}: {}", ip, e);
                            return None;
                        }
                    },
                    _ = shutdown.cancelled() => return None,
                };
                if shutdown.is_cancelled() {
                    return None;
                }

                probe_one(&inner, ip, gateway).await
            });

            handles.push((ip, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (ip, handle) in handles {
            let host = match handle.await {
                Ok(host) => host,
                Err(e) => {
                    tracing::warn!("Probe task for {} failed: {}", ip, e);
                    None
                }
            };
            outcomes.push(ProbeOutcome { ip, host });
        }

        outcomes
    }
}

async fn probe_one(inner: &Arc<ProberInner>, ip: Ipv4Addr, gateway: Ipv4Addr) -> Option<DiscoveredHost> {
    let config = inner.config;

    if !inner.probe.is_reachable(ip, config.probe_timeout).await {
        return None;
    }

    if !config.settle_delay.is_zero() {
        tokio::time::sleep(config.settle_delay).await;
    }

    let neighbors = Arc::clone(&inner.neighbors);
    let entry = match tokio::task::spawn_blocking(move || neighbors.lookup(ip)).await {
        Ok(Ok(Some(entry))) => entry,
        Ok(Ok(None)) => {
            tracing::debug!("{} answered but has no neighbor entry", ip);
            return None;
        }
        Ok(Err(e)) => {
            tracing::debug!("Neighbor lookup for {} failed: {:#}", ip, e);
            return None;
        }
        Err(e) => {
            tracing::warn!("Neighbor lookup worker for {} failed: {}", ip, e);
            return None;
        }
    };

    let mac = match validate_neighbor_entry(&entry) {
        Ok(mac) => mac.to_string(),
        Err(reason) => {
            tracing::debug!("Rejected neighbor entry for {}: {}", ip, reason);
            return None;
        }
    };

    let resolver = Arc::clone(&inner.resolver);
    let hostname = match tokio::time::timeout(
        config.dns_timeout,
        tokio::task::spawn_blocking(move || resolver.resolve(ip)),
    )
    .await
    {
        Ok(Ok(name)) => name,
        Ok(Err(e)) => {
            tracing::warn!("Name resolution worker for {} failed: {}", ip, e);
            None
        }
        Err(_) => None,
    };

    let vendor_info = lookup_vendor_info(&mac);
    let is_gateway = ip == gateway;
    let device_class = inner.classifier.classify(
        vendor_info.vendor.as_deref(),
        hostname.as_deref(),
        is_gateway,
    );

    tracing::debug!("Discovered {} -> {} ({})", ip, mac, device_class.as_str());

    Some(DiscoveredHost {
        ip,
        mac,
        vendor: vendor_info.vendor,
        hostname,
        is_gateway,
        is_randomized: vendor_info.is_randomized,
        device_class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{
        DeviceClass, HeuristicClassifier, NeighborEntry, NeighborKind, parse_mac,
    };
    use crate::scanner::icmp::ProbeFuture;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        alive: HashSet<Ipv4Addr>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
        delay: Duration,
    }

    impl CountingProbe {
        fn new(alive: &[Ipv4Addr], delay: Duration) -> Self {
            Self {
                alive: alive.iter().copied().collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl ReachabilityProbe for CountingProbe {
        fn is_reachable(&self, ip: Ipv4Addr, _timeout: Duration) -> ProbeFuture<'_> {
            Box::pin(async move {
                self.started.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.alive.contains(&ip)
            })
        }
    }

    struct MapNeighbors(HashMap<Ipv4Addr, NeighborEntry>);

    impl NeighborTable for MapNeighbors {
        fn entries(&self) -> anyhow::Result<Vec<NeighborEntry>> {
            Ok(self.0.values().cloned().collect())
        }
    }

    struct NoNames;

    impl NameResolver for NoNames {
        fn resolve(&self, _ip: Ipv4Addr) -> Option<String> {
            None
        }
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, last)
    }

    fn entry(last: u8, mac: &str, kind: NeighborKind) -> (Ipv4Addr, NeighborEntry) {
        (
            ip(last),
            NeighborEntry {
                ip: ip(last),
                mac: parse_mac(mac),
                kind,
            },
        )
    }

    fn test_config(max_in_flight: usize) -> ProberConfig {
        ProberConfig {
            max_in_flight,
            probe_timeout: Duration::from_millis(100),
            settle_delay: Duration::ZERO,
            dns_timeout: Duration::from_millis(100),
        }
    }

    fn prober(probe: Arc<CountingProbe>, neighbors: MapNeighbors, max: usize) -> HostProber {
        HostProber::new(
            probe,
            Arc::new(neighbors),
            Arc::new(NoNames),
            Arc::new(HeuristicClassifier::default()),
            test_config(max),
        )
    }

    #[tokio::test]
    async fn never_exceeds_in_flight_bound() {
        let targets: Vec<Ipv4Addr> = (1..=120).map(ip).collect();
        let probe = Arc::new(CountingProbe::new(&[], Duration::from_millis(5)));
        let prober = prober(Arc::clone(&probe), MapNeighbors(HashMap::new()), 8);

        let outcomes = prober.probe_all(&targets, ip(1), &Shutdown::new()).await;

        assert_eq!(outcomes.len(), 120);
        assert!(outcomes.iter().all(|o| !o.discovered()));
        assert!(probe.peak.load(Ordering::SeqCst) <= 8);
        assert_eq!(probe.started.load(Ordering::SeqCst), 120);
    }

    #[tokio::test]
    async fn records_only_reachable_hosts_with_valid_neighbor_entries() {
        let neighbors = MapNeighbors(HashMap::from([
            entry(1, "a4:91:b1:0c:22:01", NeighborKind::Dynamic),
            entry(20, "00:00:00:00:00:00", NeighborKind::Dynamic),
            entry(30, "3c:22:fb:aa:bb:cc", NeighborKind::Static),
            entry(40, "3c:22:fb:aa:bb:dd", NeighborKind::Dynamic),
            entry(50, "3c:22:fb:aa:bb:ee", NeighborKind::Dynamic),
        ]));
        // .50 has a neighbor entry but never answers the probe
        let alive = [ip(1), ip(20), ip(30), ip(40), ip(60)];
        let probe = Arc::new(CountingProbe::new(&alive, Duration::ZERO));
        let prober = prober(probe, neighbors, 4);

        let targets: Vec<Ipv4Addr> = [1, 20, 30, 40, 50, 60].into_iter().map(ip).collect();
        let outcomes = prober.probe_all(&targets, ip(1), &Shutdown::new()).await;

        let discovered: Vec<&DiscoveredHost> =
            outcomes.iter().filter_map(|o| o.host.as_ref()).collect();
        assert_eq!(discovered.len(), 2);

        let gateway = discovered.iter().find(|h| h.ip == ip(1)).unwrap();
        assert!(gateway.is_gateway);
        assert_eq!(gateway.device_class, DeviceClass::Router);
        assert_eq!(gateway.mac, "a4:91:b1:0c:22:01");

        assert!(discovered.iter().any(|h| h.ip == ip(40) && !h.is_gateway));
    }

    #[tokio::test]
    async fn cancelled_sweep_starts_no_new_probes() {
        let targets: Vec<Ipv4Addr> = (1..=50).map(ip).collect();
        let probe = Arc::new(CountingProbe::new(&[], Duration::from_millis(5)));
        let prober = prober(Arc::clone(&probe), MapNeighbors(HashMap::new()), 4);

        let shutdown = Shutdown::new();
        shutdown.cancel();
        let outcomes = prober.probe_all(&targets, ip(1), &shutdown).await;

        assert_eq!(outcomes.len(), 50);
        assert_eq!(probe.started.load(Ordering::SeqCst), 0);
    }
}

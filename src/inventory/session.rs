//! Scan session orchestration
//!
//! One session: capture the interface, clear devices on a network change,
//! enumerate the subnet, probe everything, merge discoveries, then mark the
//! absentees offline. Sessions never overlap.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::registry::DeviceRegistry;
use crate::config;
use crate::models::{Device, NetworkInterfaceSnapshot};
use crate::monitor::{EventBus, NetworkEvent};
use crate::network::{InterfaceProvider, enumerate_hosts, limit_scan_window};
use crate::scanner::HostProber;
use crate::shutdown::Shutdown;

/// A single timestamped sweep of the subnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub interface: NetworkInterfaceSnapshot,
    pub targets: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkChange {
    pub old_gateway: Ipv4Addr,
    pub new_gateway: Ipv4Addr,
}

/// Outcome of a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub session: ScanSession,
    /// Devices that answered in this session
    pub discovered: Vec<Device>,
    /// Hardware addresses marked offline by this session
    pub marked_offline: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_change: Option<NetworkChange>,
    pub duration_ms: u64,
}

pub struct ScanOrchestrator {
    interfaces: Arc<dyn InterfaceProvider>,
    prober: HostProber,
    registry: Arc<DeviceRegistry>,
    bus: EventBus,
    max_hosts: usize,
    session_lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl ScanOrchestrator {
    pub fn new(
        interfaces: Arc<dyn InterfaceProvider>,
        prober: HostProber,
        registry: Arc<DeviceRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            interfaces,
            prober,
            registry,
            bus,
            max_hosts: config::max_scan_hosts(),
            session_lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_max_hosts(mut self, max_hosts: usize) -> Self {
        self.max_hosts = max_hosts.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Runs one full session. A session already in progress is waited for.
    pub async fn run_session(&self, shutdown: &Shutdown) -> Result<ScanReport> {
        let _guard = self.session_lock.lock().await;

        let interface = self
            .interfaces
            .current_interface()
            .ok_or_else(|| anyhow!("No active network interface"))?;
        let started_at = Utc::now();
        let start = Instant::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            "[SCAN] Session #{} on {} ({}/{}, gateway {})",
            id,
            interface.name,
            interface.address,
            interface.subnet_mask,
            interface.gateway
        );

        // Stale devices from a previous network must not look "seen" here
        let network_change = match self.registry.observe_gateway(interface.gateway)? {
            Some(old_gateway) => {
                let cleared = self.registry.mark_all_offline(started_at)?;
                tracing::info!(
                    "[SCAN] Network changed ({} -> {}), {} devices marked offline",
                    old_gateway,
                    interface.gateway,
                    cleared.len()
                );
                self.bus.publish(NetworkEvent::NetworkChanged {
                    old_gateway: Some(old_gateway),
                    new_gateway: interface.gateway,
                });
                Some(NetworkChange {
                    old_gateway,
                    new_gateway: interface.gateway,
                })
            }
            None => None,
        };

        let hosts = enumerate_hosts(interface.address, interface.subnet_mask)
            .with_context(|| format!("Cannot enumerate subnet of {}", interface.name))?;
        let targets: Vec<Ipv4Addr> = limit_scan_window(hosts, interface.address, self.max_hosts)
            .into_iter()
            .filter(|ip| *ip != interface.address)
            .collect();

        let session = ScanSession {
            id,
            started_at,
            interface,
            targets: targets.len(),
        };

        let outcomes = self
            .prober
            .probe_all(&targets, session.interface.gateway, shutdown)
            .await;

        let mut discovered = Vec::new();
        let mut present = HashSet::new();
        for host in outcomes.into_iter().filter_map(|o| o.host) {
            let recorded = self.registry.record_discovery(&host, Utc::now())?;
            present.insert(recorded.device.mac.clone());
            self.bus.publish(NetworkEvent::DeviceDiscovered {
                device: recorded.device.clone(),
                is_new: recorded.is_new,
            });
            discovered.push(recorded.device);
        }

        if shutdown.is_cancelled() {
            bail!("Scan session #{} cancelled before completion", id);
        }

        let marked_offline: Vec<String> = self
            .registry
            .mark_absent(&present, session.started_at)?
            .into_iter()
            .map(|d| d.mac)
            .collect();

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "[SCAN] Session #{} complete: {}/{} hosts found, {} offline, {}ms",
            id,
            discovered.len(),
            session.targets,
            marked_offline.len(),
            duration_ms
        );

        self.bus.publish(NetworkEvent::ScanCompleted {
            session_id: id,
            hosts_probed: session.targets,
            hosts_found: discovered.len(),
            marked_offline: marked_offline.len(),
            duration_ms,
        });

        Ok(ScanReport {
            session,
            discovered,
            marked_offline,
            network_change,
            duration_ms,
        })
    }
}

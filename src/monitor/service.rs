//! Background network monitor
//!
//! Runs the three independent loops: discovery, security evaluation and
//! connection sampling. Each stops at its next wait point on shutdown.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::events::{EventBus, NetworkEvent};
use crate::alerts::{DetectorInputs, HotspotSubnetClassifier, SecurityDetector};
use crate::config::{self, MonitorSettings};
use crate::feeds::{ConnectionSampler, FeedHub, ProcNetConnectionSampler, run_connection_sampler};
use crate::inventory::{DeviceRegistry, ScanOrchestrator};
use crate::network::{
    HeuristicClassifier, InterfaceProvider, SystemInterfaceProvider, SystemNeighborTable,
    SystemResolver,
};
use crate::scanner::{HostProber, IcmpProbe, ProberConfig};
use crate::shutdown::Shutdown;
use crate::store::{AlertDispatcher, DeviceStore};

/// Monitoring status information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub is_running: bool,
    pub auto_scan: bool,
    pub scan_interval_seconds: u64,
    pub scan_count: u32,
    pub last_scan_time: Option<String>,
    pub devices_online: usize,
    pub devices_total: usize,
}

/// Everything the monitor loops run on
#[derive(Clone)]
pub struct MonitorComponents {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub detector: Arc<SecurityDetector>,
    pub sampler: Arc<dyn ConnectionSampler>,
    pub hub: FeedHub,
    pub store: Arc<dyn DeviceStore>,
    pub bus: EventBus,
}

impl MonitorComponents {
    /// Wires the OS-backed collaborators around `store` and `bus`.
    /// Fails when the ICMP socket cannot be opened.
    pub fn system(
        preferred_interface: Option<String>,
        store: Arc<dyn DeviceStore>,
        bus: EventBus,
    ) -> Result<Self> {
        let interfaces: Arc<dyn InterfaceProvider> =
            Arc::new(SystemInterfaceProvider::new(preferred_interface));
        let neighbors = Arc::new(SystemNeighborTable);
        let probe = IcmpProbe::new().context("ICMP probing unavailable (try elevated privileges)")?;

        let prober = HostProber::new(
            Arc::new(probe),
            neighbors.clone(),
            Arc::new(SystemResolver),
            Arc::new(HeuristicClassifier::default()),
            ProberConfig::from_env(),
        );

        let registry = Arc::new(DeviceRegistry::new(Some(Arc::clone(&store))));
        match registry.load_from_store() {
            Ok(count) => tracing::debug!("Loaded {} devices from store", count),
            Err(e) => tracing::warn!("Failed to load devices from store: {:#}", e),
        }

        let orchestrator = Arc::new(ScanOrchestrator::new(
            Arc::clone(&interfaces),
            prober,
            Arc::clone(&registry),
            bus.clone(),
        ));

        let hub = FeedHub::new();
        let detector = Arc::new(SecurityDetector::new(DetectorInputs {
            interfaces,
            neighbors,
            registry,
            connections: Arc::new(hub.clone()),
            bandwidth: Arc::new(hub.clone()),
            store: Arc::clone(&store),
            sink: Arc::new(AlertDispatcher::new(Arc::clone(&store), bus.clone())),
            modes: Arc::new(HotspotSubnetClassifier::default()),
        }));

        Ok(Self {
            orchestrator,
            detector,
            sampler: Arc::new(ProcNetConnectionSampler::default()),
            hub,
            store,
            bus,
        })
    }
}

/// Background network monitor
pub struct NetworkMonitor {
    components: MonitorComponents,
    is_running: Arc<AtomicBool>,
    scan_count: Arc<AtomicU32>,
    last_scan_time: Arc<Mutex<Option<String>>>,
    scan_trigger: Arc<Notify>,
    shutdown: Mutex<Option<Shutdown>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    detector_tick: Duration,
    sampler_interval: Duration,
}

impl NetworkMonitor {
    pub fn new(components: MonitorComponents) -> Self {
        Self {
            components,
            is_running: Arc::new(AtomicBool::new(false)),
            scan_count: Arc::new(AtomicU32::new(0)),
            last_scan_time: Arc::new(Mutex::new(None)),
            scan_trigger: Arc::new(Notify::new()),
            shutdown: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            detector_tick: config::detector_tick(),
            sampler_interval: config::sampler_interval(),
        }
    }

    pub fn with_intervals(mut self, detector_tick: Duration, sampler_interval: Duration) -> Self {
        self.detector_tick = detector_tick;
        self.sampler_interval = sampler_interval;
        self
    }

    pub fn components(&self) -> &MonitorComponents {
        &self.components
    }

    pub fn events(&self) -> &EventBus {
        &self.components.bus
    }

    fn settings(&self) -> MonitorSettings {
        current_settings(self.components.store.as_ref())
    }

    /// Start the three loops. Idempotent while running.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let shutdown = Shutdown::new();
        *self.shutdown.lock().await = Some(shutdown.clone());
        self.scan_count.store(0, Ordering::SeqCst);

        let settings = self.settings();
        self.components.bus.publish(NetworkEvent::MonitoringStarted {
            scan_interval_seconds: settings.scan_interval().as_secs(),
        });
        tracing::info!(
            "[MONITOR] Started (auto scan: {}, every {} min)",
            settings.auto_scan,
            settings.scan_interval_minutes
        );

        let discovery = tokio::spawn(discovery_loop(
            Arc::clone(&self.components.orchestrator),
            Arc::clone(&self.components.store),
            self.components.bus.clone(),
            Arc::clone(&self.scan_trigger),
            Arc::clone(&self.scan_count),
            Arc::clone(&self.last_scan_time),
            shutdown.clone(),
        ));
        let detector = tokio::spawn(
            Arc::clone(&self.components.detector).run(self.detector_tick, shutdown.clone()),
        );
        let sampler = tokio::spawn(run_connection_sampler(
            Arc::clone(&self.components.sampler),
            self.components.hub.clone(),
            self.sampler_interval,
            shutdown,
        ));

        self.handles
            .lock()
            .await
            .extend([discovery, detector, sampler]);
        Ok(())
    }

    /// Request an immediate scan (coalesced with one already pending)
    pub fn trigger_scan(&self) {
        self.scan_trigger.notify_one();
    }

    /// Signal every loop to stop and wait for them to finish
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(shutdown) = self.shutdown.lock().await.take() {
            shutdown.cancel();
        }
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("[MONITOR] Loop task failed: {}", e);
            }
        }

        tracing::info!("[MONITOR] Stopped");
        self.components.bus.publish(NetworkEvent::MonitoringStopped);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Get current monitoring status
    pub async fn status(&self) -> MonitorStatus {
        let settings = self.settings();
        let registry = self.components.orchestrator.registry();
        let (online, total) = match registry.snapshot() {
            Ok(devices) => (devices.iter().filter(|d| d.is_online).count(), devices.len()),
            Err(e) => {
                tracing::warn!("[MONITOR] Registry unavailable: {:#}", e);
                (0, 0)
            }
        };

        MonitorStatus {
            is_running: self.is_running(),
            auto_scan: settings.auto_scan,
            scan_interval_seconds: settings.scan_interval().as_secs(),
            scan_count: self.scan_count.load(Ordering::SeqCst),
            last_scan_time: self.last_scan_time.lock().await.clone(),
            devices_online: online,
            devices_total: total,
        }
    }
}

fn current_settings(store: &dyn DeviceStore) -> MonitorSettings {
    store.latest_settings().unwrap_or_else(|e| {
        tracing::warn!("[MONITOR] Using default settings: {:#}", e);
        MonitorSettings::default()
    })
}

async fn discovery_loop(
    orchestrator: Arc<ScanOrchestrator>,
    store: Arc<dyn DeviceStore>,
    bus: EventBus,
    trigger: Arc<Notify>,
    scan_count: Arc<AtomicU32>,
    last_scan_time: Arc<Mutex<Option<String>>>,
    shutdown: Shutdown,
) {
    // First session runs right away when auto scanning
    let mut run_now = current_settings(store.as_ref()).auto_scan;

    loop {
        if !run_now {
            let settings = current_settings(store.as_ref());
            let interval = settings.scan_interval();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = trigger.notified() => {}
                _ = tokio::time::sleep(interval), if settings.auto_scan => {}
            }
        }
        run_now = false;

        if shutdown.is_cancelled() {
            break;
        }

        let current_scan = scan_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("[MONITOR] Starting scan #{}", current_scan);

        match orchestrator.run_session(&shutdown).await {
            Ok(report) => {
                *last_scan_time.lock().await = Some(report.session.started_at.to_rfc3339());
            }
            Err(e) if shutdown.is_cancelled() => {
                tracing::debug!("[MONITOR] Scan #{} interrupted: {:#}", current_scan, e);
                break;
            }
            Err(e) => {
                tracing::error!("[MONITOR] Scan #{} failed: {:#}", current_scan, e);
                bus.publish(NetworkEvent::MonitoringError {
                    message: format!("{:#}", e),
                });
            }
        }
    }

    tracing::debug!("[MONITOR] Discovery loop stopped");
}

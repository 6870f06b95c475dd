//! Security detector loop
//!
//! A coarse tick re-checks each enabled rule's own interval and dispatches
//! the due ones. All detector state sits behind one mutex; alerts are handed
//! to the sink after the lock is released.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::connections::ConnectionBaseline;
use super::gateway::{GatewayObservation, GatewaySpoofState, transition};
use super::hotspot::{NetworkMode, NetworkModeClassifier};
use super::rules::{DetectionRule, RuleType, RuleUpdate, default_rules};
use super::traffic::traffic_spike_alerts;
use super::types::{AlertKind, AlertSeverity, SecurityAlert};
use super::unknown::{UnknownDeviceTracker, hotspot_limit_alert};
use crate::config::{self, MonitorSettings};
use crate::feeds::{BandwidthFeed, ConnectionFeed};
use crate::inventory::DeviceRegistry;
use crate::models::NetworkInterfaceSnapshot;
use crate::network::{InterfaceProvider, NeighborTable, validate_neighbor_entry};
use crate::shutdown::Shutdown;
use crate::store::{AlertSink, DeviceStore};

/// Collaborators the detector reads from and writes to
#[derive(Clone)]
pub struct DetectorInputs {
    pub interfaces: Arc<dyn InterfaceProvider>,
    pub neighbors: Arc<dyn NeighborTable>,
    pub registry: Arc<DeviceRegistry>,
    pub connections: Arc<dyn ConnectionFeed>,
    pub bandwidth: Arc<dyn BandwidthFeed>,
    pub store: Arc<dyn DeviceStore>,
    pub sink: Arc<dyn AlertSink>,
    pub modes: Arc<dyn NetworkModeClassifier>,
}

struct DetectorState {
    rules: Vec<DetectionRule>,
    gateway: GatewaySpoofState,
    unknown: UnknownDeviceTracker,
    connections: ConnectionBaseline,
    interface: Option<NetworkInterfaceSnapshot>,
    applied_settings: Option<MonitorSettings>,
}

pub struct SecurityDetector {
    inputs: DetectorInputs,
    hotspot_max_devices: usize,
    state: Mutex<DetectorState>,
}

impl SecurityDetector {
    /// Seeds the unknown-device tracker with every device the store knows.
    /// A failing store starts the tracker empty.
    pub fn new(inputs: DetectorInputs) -> Self {
        let known = match inputs.store.all_devices() {
            Ok(devices) => devices.into_iter().map(|d| d.mac).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!("Could not load known devices for detector: {:#}", e);
                Vec::new()
            }
        };
        tracing::debug!("Detector starting with {} known devices", known.len());

        Self {
            inputs,
            hotspot_max_devices: config::hotspot_expected_max_devices(),
            state: Mutex::new(DetectorState {
                rules: default_rules(),
                gateway: GatewaySpoofState::default(),
                unknown: UnknownDeviceTracker::with_known(known),
                connections: ConnectionBaseline::default(),
                interface: None,
                applied_settings: None,
            }),
        }
    }

    pub fn with_hotspot_max_devices(mut self, max: usize) -> Self {
        self.hotspot_max_devices = max.max(1);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, DetectorState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Detector state lock poisoned"))
    }

    pub fn rules(&self) -> Result<Vec<DetectionRule>> {
        Ok(self.lock()?.rules.clone())
    }

    pub fn update_rule(&self, name: &str, update: &RuleUpdate) -> Result<DetectionRule> {
        let mut state = self.lock()?;
        let Some(rule) = state
            .rules
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(name))
        else {
            bail!("Unknown detection rule '{}'", name);
        };
        update.apply(rule);
        tracing::info!("Rule '{}' updated: {:?}", rule.name, update);
        Ok(rule.clone())
    }

    pub fn gateway_state(&self) -> Result<GatewaySpoofState> {
        Ok(self.lock()?.gateway.clone())
    }

    /// Evaluates every due rule at `now`, raises the resulting alerts and
    /// returns them. A failing rule is logged and skipped.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<SecurityAlert>> {
        let interface = self.inputs.interfaces.current_interface();
        let settings = match self.inputs.store.latest_settings() {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!("Could not read monitor settings: {:#}", e);
                None
            }
        };

        let alerts = {
            let mut state = self.lock()?;
            let state = &mut *state;

            if let Some(settings) = settings {
                apply_settings(state, settings);
            }
            track_interface(state, interface.as_ref(), now);

            let mode = interface
                .as_ref()
                .map(|i| self.inputs.modes.classify(i.gateway))
                .unwrap_or_default();

            let mut alerts = Vec::new();
            for index in 0..state.rules.len() {
                if !state.rules[index].is_due(now) {
                    continue;
                }
                let rule = state.rules[index].clone();
                match self.evaluate(&rule, state, interface.as_ref(), mode, now) {
                    Ok(raised) => alerts.extend(
                        raised
                            .into_iter()
                            .map(|alert| apply_rule_severity(alert, &rule, mode)),
                    ),
                    Err(e) => tracing::warn!("Rule '{}' failed: {:#}", rule.name, e),
                }
                state.rules[index].last_evaluated = Some(now);
            }
            alerts
        };

        for alert in &alerts {
            self.inputs.sink.raise(alert.clone());
        }
        Ok(alerts)
    }

    fn evaluate(
        &self,
        rule: &DetectionRule,
        state: &mut DetectorState,
        interface: Option<&NetworkInterfaceSnapshot>,
        mode: NetworkMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<SecurityAlert>> {
        match rule.rule_type {
            RuleType::GatewaySpoof => {
                let Some(interface) = interface else {
                    return Ok(Vec::new());
                };
                let Some(observation) = self.observe_gateway(interface)? else {
                    return Ok(Vec::new());
                };
                let (next, alert) =
                    transition(std::mem::take(&mut state.gateway), &observation, now, mode);
                state.gateway = next;
                Ok(alert.into_iter().collect())
            }
            RuleType::UnknownDevice => {
                let Some(interface) = interface else {
                    return Ok(Vec::new());
                };
                let online: Vec<_> = self
                    .inputs
                    .registry
                    .known_devices(interface)?
                    .into_iter()
                    .filter(|d| d.is_online)
                    .collect();

                let mut alerts = state.unknown.evaluate(&online, now);
                alerts.extend(hotspot_limit_alert(
                    mode,
                    online.len(),
                    self.hotspot_max_devices,
                    now,
                ));
                Ok(alerts)
            }
            RuleType::TrafficSpike => Ok(self
                .inputs
                .bandwidth
                .latest_speeds()
                .map(|sample| traffic_spike_alerts(sample, rule.threshold, now))
                .unwrap_or_default()),
            RuleType::ExcessiveConnections => {
                let Some(stats) = self.inputs.connections.latest_stats() else {
                    return Ok(Vec::new());
                };
                let floor = if rule.threshold.is_finite() && rule.threshold > 0.0 {
                    rule.threshold as u64
                } else {
                    0
                };
                Ok(state
                    .connections
                    .observe(stats.total, now, mode, floor)
                    .into_iter()
                    .collect())
            }
        }
    }

    /// Reads the gateway's hardware address from the neighbor table
    fn observe_gateway(
        &self,
        interface: &NetworkInterfaceSnapshot,
    ) -> Result<Option<GatewayObservation>> {
        let Some(entry) = self.inputs.neighbors.lookup(interface.gateway)? else {
            tracing::debug!("Gateway {} not in neighbor table", interface.gateway);
            return Ok(None);
        };
        match validate_neighbor_entry(&entry) {
            Ok(mac) => Ok(Some(GatewayObservation::new(
                interface.gateway,
                mac.to_string(),
            ))),
            Err(reason) => {
                tracing::debug!("Ignoring gateway entry {}: {}", interface.gateway, reason);
                Ok(None)
            }
        }
    }

    /// Ticks every `tick` until shutdown. Evaluation runs on the blocking
    /// pool because neighbor-table reads may spawn processes.
    pub async fn run(self: Arc<Self>, tick: Duration, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("[DETECTOR] Started (tick {}s)", tick.as_secs());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let detector = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || detector.tick(Utc::now())).await {
                Ok(Ok(alerts)) if !alerts.is_empty() => {
                    tracing::debug!("[DETECTOR] {} alerts raised", alerts.len());
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!("[DETECTOR] Tick failed: {:#}", e),
                Err(e) => tracing::error!("[DETECTOR] Tick task failed: {}", e),
            }
        }

        tracing::info!("[DETECTOR] Stopped");
    }
}

/// Pushes changed store settings into the rule thresholds. Explicit rule
/// updates stay in effect until the settings change again.
fn apply_settings(state: &mut DetectorState, settings: MonitorSettings) {
    if state.applied_settings.as_ref() == Some(&settings) {
        return;
    }
    for rule in &mut state.rules {
        match rule.rule_type {
            RuleType::TrafficSpike => rule.threshold = settings.traffic_spike_threshold_kbps,
            RuleType::ExcessiveConnections => {
                rule.threshold = settings.connection_count_threshold as f64
            }
            RuleType::GatewaySpoof | RuleType::UnknownDevice => {}
        }
    }
    state.applied_settings = Some(settings);
}

/// Resets interface-bound state when the active attachment changes
fn track_interface(
    state: &mut DetectorState,
    current: Option<&NetworkInterfaceSnapshot>,
    now: DateTime<Utc>,
) {
    let Some(current) = current else {
        return;
    };
    match &state.interface {
        Some(previous) if previous.same_attachment(current) => return,
        Some(previous) => {
            tracing::info!(
                "[DETECTOR] Interface changed ({} via {} -> {} via {}), resetting gateway state",
                previous.address,
                previous.gateway,
                current.address,
                current.gateway
            );
            state.gateway = GatewaySpoofState::after_interface_change(now);
            state.connections.reset();
        }
        None => {}
    }
    state.interface = Some(current.clone());
}

fn apply_rule_severity(
    mut alert: SecurityAlert,
    rule: &DetectionRule,
    mode: NetworkMode,
) -> SecurityAlert {
    alert.severity = if alert.kind == AlertKind::GatewaySpoof && mode.is_hotspot() {
        rule.severity.min(AlertSeverity::Warning)
    } else {
        rule.severity
    };
    alert
}

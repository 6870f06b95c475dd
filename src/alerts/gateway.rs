//! Gateway hardware-address spoof detection
//!
//! The detector keeps a confirmed baseline MAC for the default gateway. A
//! different MAC must be seen repeatedly, without gaps longer than the
//! recheck window, for the whole confirmation period before it is reported:
//!
//! ```text
//! Stable --mismatch--> Suspected --same suspect within window--> Confirming
//!    ^                     |  ^                                      |
//!    |                     |  +------ third MAC / gap too long ------+
//!    +---- baseline MAC seen again, or confirmed (alert, adopt) -----+
//! ```
//!
//! Transitions are a pure function of (state, observation, now, mode).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::hotspot::NetworkMode;
use super::types::{AlertKind, AlertSeverity, SecurityAlert};
use crate::config::{
    GATEWAY_CONFIRMATION_HOTSPOT_SECS, GATEWAY_CONFIRMATION_SECS, GATEWAY_MIN_RECHECKS,
    GATEWAY_RECHECK_WINDOW_SECS, INTERFACE_CHANGE_GRACE_SECS,
};

/// One reading of the gateway's hardware address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayObservation {
    pub gateway_ip: Ipv4Addr,
    pub mac: String,
}

impl GatewayObservation {
    pub fn new(gateway_ip: Ipv4Addr, mac: impl Into<String>) -> Self {
        Self {
            gateway_ip,
            mac: mac.into().to_ascii_lowercase(),
        }
    }
}

/// Where the suspicion currently stands
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GatewayPhase {
    /// Gateway matches the baseline (or no baseline yet)
    #[default]
    Stable,
    /// A different MAC was seen once
    Suspected {
        suspect: String,
        since: DateTime<Utc>,
        last_seen: DateTime<Utc>,
        rechecks: u32,
    },
    /// The same different MAC keeps being seen
    Confirming {
        suspect: String,
        since: DateTime<Utc>,
        last_seen: DateTime<Utc>,
        rechecks: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewaySpoofState {
    pub baseline: Option<String>,
    pub phase: GatewayPhase,
    pub interface_changed_at: Option<DateTime<Utc>>,
}

impl GatewaySpoofState {
    /// State right after the active interface changed: no baseline and a
    /// grace period during which observations are ignored.
    pub fn after_interface_change(now: DateTime<Utc>) -> Self {
        Self {
            baseline: None,
            phase: GatewayPhase::Stable,
            interface_changed_at: Some(now),
        }
    }

    pub fn suspect(&self) -> Option<&str> {
        match &self.phase {
            GatewayPhase::Stable => None,
            GatewayPhase::Suspected { suspect, .. } | GatewayPhase::Confirming { suspect, .. } => {
                Some(suspect)
            }
        }
    }

    fn in_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.interface_changed_at
            .is_some_and(|at| now - at < Duration::seconds(INTERFACE_CHANGE_GRACE_SECS))
    }
}

pub fn confirmation_period(mode: NetworkMode) -> Duration {
    match mode {
        NetworkMode::Normal => Duration::seconds(GATEWAY_CONFIRMATION_SECS),
        NetworkMode::Hotspot => Duration::seconds(GATEWAY_CONFIRMATION_HOTSPOT_SECS),
    }
}

/// Advances the spoof state by one observation
pub fn transition(
    state: GatewaySpoofState,
    observation: &GatewayObservation,
    now: DateTime<Utc>,
    mode: NetworkMode,
) -> (GatewaySpoofState, Option<SecurityAlert>) {
    if state.in_grace_period(now) {
        return (state, None);
    }

    let mac = observation.mac.as_str();
    let GatewaySpoofState {
        baseline,
        phase,
        interface_changed_at,
    } = state;

    let Some(baseline) = baseline else {
        tracing::debug!("Adopting gateway baseline {} ({})", mac, observation.gateway_ip);
        return (
            GatewaySpoofState {
                baseline: Some(mac.to_string()),
                phase: GatewayPhase::Stable,
                interface_changed_at,
            },
            None,
        );
    };

    if mac == baseline {
        if phase != GatewayPhase::Stable {
            tracing::info!("Gateway {} back on baseline {}", observation.gateway_ip, mac);
        }
        return (
            GatewaySpoofState {
                baseline: Some(baseline),
                phase: GatewayPhase::Stable,
                interface_changed_at,
            },
            None,
        );
    }

    let suspected_fresh = GatewayPhase::Suspected {
        suspect: mac.to_string(),
        since: now,
        last_seen: now,
        rechecks: 1,
    };

    let next_phase = match phase {
        GatewayPhase::Stable => {
            tracing::warn!(
                "Gateway {} MAC changed {} -> {}, watching",
                observation.gateway_ip,
                baseline,
                mac
            );
            suspected_fresh
        }
        GatewayPhase::Suspected {
            suspect,
            since,
            last_seen,
            rechecks,
        }
        | GatewayPhase::Confirming {
            suspect,
            since,
            last_seen,
            rechecks,
        } => {
            if suspect != mac {
                tracing::warn!("Gateway suspect changed {} -> {}, restarting", suspect, mac);
                suspected_fresh
            } else if now - last_seen > Duration::seconds(GATEWAY_RECHECK_WINDOW_SECS) {
                tracing::debug!("Gateway suspect {} not rechecked in time, restarting", mac);
                suspected_fresh
            } else {
                GatewayPhase::Confirming {
                    suspect,
                    since,
                    last_seen: now,
                    rechecks: rechecks.saturating_add(1),
                }
            }
        }
    };

    if let GatewayPhase::Confirming {
        since, rechecks, ..
    } = &next_phase
        && *rechecks >= GATEWAY_MIN_RECHECKS
        && now - *since >= confirmation_period(mode)
    {
        let alert = spoof_alert(observation, &baseline, *since, now, mode);
        return (
            GatewaySpoofState {
                baseline: Some(mac.to_string()),
                phase: GatewayPhase::Stable,
                interface_changed_at,
            },
            Some(alert),
        );
    }

    (
        GatewaySpoofState {
            baseline: Some(baseline),
            phase: next_phase,
            interface_changed_at,
        },
        None,
    )
}

fn spoof_alert(
    observation: &GatewayObservation,
    baseline: &str,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    mode: NetworkMode,
) -> SecurityAlert {
    let severity = if mode.is_hotspot() {
        AlertSeverity::Warning
    } else {
        AlertSeverity::Critical
    };

    SecurityAlert::new(
        AlertKind::GatewaySpoof,
        "Possible gateway spoofing",
        format!(
            "Gateway {} has answered with {} instead of {} for {}s. \
             Someone on this network may be intercepting traffic.",
            observation.gateway_ip,
            observation.mac,
            baseline,
            (now - since).num_seconds()
        ),
        now,
    )
    .with_source(observation.gateway_ip.to_string(), observation.mac.clone())
    .with_severity(severity)
}

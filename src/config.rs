//! Configuration constants and runtime overrides for lanwatch
//!
//! Every tunable has a compile-time default plus an optional `LANWATCH_*`
//! environment override clamped to a sane range.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum probes in flight during a single scan session
pub const MAX_IN_FLIGHT_PROBES: usize = 50;

/// Reachability probe timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Delay between a successful probe and the neighbor-table read
pub const NEIGHBOR_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Reverse name resolution timeout (runs on the blocking pool)
pub const DNS_TIMEOUT: Duration = Duration::from_millis(2000);

/// Maximum hosts to probe per session (a /22 worth of addresses)
pub const MAX_SCAN_HOSTS: usize = 1024;

// ====== Security Detector ======

/// Coarse tick of the detector loop; per-rule intervals are layered on top
pub const DETECTOR_TICK: Duration = Duration::from_secs(5);

/// Window in which a repeated suspect gateway MAC counts as a recheck
pub const GATEWAY_RECHECK_WINDOW_SECS: i64 = 10;

/// Time a suspect gateway MAC must persist before alerting (normal network)
pub const GATEWAY_CONFIRMATION_SECS: i64 = 20;

/// Time a suspect gateway MAC must persist before alerting (hotspot)
pub const GATEWAY_CONFIRMATION_HOTSPOT_SECS: i64 = 60;

/// Minimum consecutive sightings of the suspect MAC before alerting
pub const GATEWAY_MIN_RECHECKS: u32 = 3;

/// Gateway observations are ignored for this long after an interface change
pub const INTERFACE_CHANGE_GRACE_SECS: i64 = 30;

/// Expected maximum of online devices on a hotspot
pub const HOTSPOT_EXPECTED_MAX_DEVICES: usize = 3;

/// Connection baseline window
pub const CONNECTION_WINDOW_SECS: i64 = 60;

/// Samples required before the connection baseline is trusted
pub const CONNECTION_MIN_SAMPLES: usize = 10;

/// Flood multiplier over the rolling average (normal network)
pub const CONNECTION_MULTIPLIER: f64 = 1.8;

/// Flood multiplier over the rolling average (hotspot)
pub const CONNECTION_MULTIPLIER_HOTSPOT: f64 = 3.0;

/// Minimum gap between two excessive-connection alerts
pub const CONNECTION_ALERT_DEBOUNCE_SECS: i64 = 30;

// ====== Monitoring ======

/// Interval of the connection/bandwidth samplers
pub const SAMPLER_INTERVAL: Duration = Duration::from_secs(2);

/// Default automatic scan interval in minutes
pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 5;

/// Default upload/download spike threshold in kbps
pub const DEFAULT_TRAFFIC_SPIKE_THRESHOLD_KBPS: f64 = 5_000.0;

/// Absolute floor below which a connection count never counts as a flood.
/// Zero leaves flood detection to the baseline multiplier alone.
pub const DEFAULT_CONNECTION_COUNT_THRESHOLD: u64 = 0;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_var(name).and_then(|v| v.parse::<u64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    match env_var(name).and_then(|v| v.parse::<usize>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_f64(name: &str, default: f64, min: f64, max: f64) -> f64 {
    match env_var(name).and_then(|v| v.parse::<f64>().ok()) {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => default,
    }
}

fn env_parse_bool(name: &str, default: bool) -> bool {
    match env_var(name) {
        Some(value) => {
            let normalized = value.to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        }
        None => default,
    }
}

/// Runtime-tunable probe concurrency bound.
/// Env: `LANWATCH_MAX_IN_FLIGHT_PROBES`
pub fn max_in_flight_probes() -> usize {
    env_parse_usize("LANWATCH_MAX_IN_FLIGHT_PROBES", MAX_IN_FLIGHT_PROBES, 1, 1024)
}

/// Runtime-tunable reachability timeout.
/// Env: `LANWATCH_PROBE_TIMEOUT_MS`
pub fn probe_timeout() -> Duration {
    Duration::from_millis(env_parse_u64(
        "LANWATCH_PROBE_TIMEOUT_MS",
        PROBE_TIMEOUT.as_millis() as u64,
        50,
        10_000,
    ))
}

/// Runtime-tunable neighbor cache settle delay.
/// Env: `LANWATCH_NEIGHBOR_SETTLE_MS`
pub fn neighbor_settle_delay() -> Duration {
    Duration::from_millis(env_parse_u64(
        "LANWATCH_NEIGHBOR_SETTLE_MS",
        NEIGHBOR_SETTLE_DELAY.as_millis() as u64,
        0,
        1_000,
    ))
}

/// Runtime-tunable reverse-DNS timeout.
/// Env: `LANWATCH_DNS_TIMEOUT_MS`
pub fn dns_timeout() -> Duration {
    Duration::from_millis(env_parse_u64(
        "LANWATCH_DNS_TIMEOUT_MS",
        DNS_TIMEOUT.as_millis() as u64,
        100,
        10_000,
    ))
}

/// Runtime-tunable host cap for scan target generation.
/// Env: `LANWATCH_MAX_SCAN_HOSTS`
pub fn max_scan_hosts() -> usize {
    env_parse_usize("LANWATCH_MAX_SCAN_HOSTS", MAX_SCAN_HOSTS, 8, 65_534)
}

/// Runtime-tunable detector tick.
/// Env: `LANWATCH_DETECTOR_TICK_SECS`
pub fn detector_tick() -> Duration {
    Duration::from_secs(env_parse_u64(
        "LANWATCH_DETECTOR_TICK_SECS",
        DETECTOR_TICK.as_secs(),
        1,
        60,
    ))
}

/// Runtime-tunable sampler interval.
/// Env: `LANWATCH_SAMPLER_INTERVAL_SECS`
pub fn sampler_interval() -> Duration {
    Duration::from_secs(env_parse_u64(
        "LANWATCH_SAMPLER_INTERVAL_SECS",
        SAMPLER_INTERVAL.as_secs(),
        1,
        300,
    ))
}

/// Runtime-tunable hotspot device expectation.
/// Env: `LANWATCH_HOTSPOT_MAX_DEVICES`
pub fn hotspot_expected_max_devices() -> usize {
    env_parse_usize(
        "LANWATCH_HOTSPOT_MAX_DEVICES",
        HOTSPOT_EXPECTED_MAX_DEVICES,
        1,
        256,
    )
}

/// User-facing monitor settings, as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub auto_scan: bool,
    pub scan_interval_minutes: u64,
    pub traffic_spike_threshold_kbps: f64,
    pub connection_count_threshold: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            auto_scan: true,
            scan_interval_minutes: DEFAULT_SCAN_INTERVAL_MINUTES,
            traffic_spike_threshold_kbps: DEFAULT_TRAFFIC_SPIKE_THRESHOLD_KBPS,
            connection_count_threshold: DEFAULT_CONNECTION_COUNT_THRESHOLD,
        }
    }
}

impl MonitorSettings {
    /// Defaults overridden by `LANWATCH_AUTO_SCAN`, `LANWATCH_SCAN_INTERVAL_MINUTES`,
    /// `LANWATCH_TRAFFIC_SPIKE_KBPS` and `LANWATCH_CONNECTION_THRESHOLD`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_scan: env_parse_bool("LANWATCH_AUTO_SCAN", defaults.auto_scan),
            scan_interval_minutes: env_parse_u64(
                "LANWATCH_SCAN_INTERVAL_MINUTES",
                defaults.scan_interval_minutes,
                1,
                1_440,
            ),
            traffic_spike_threshold_kbps: env_parse_f64(
                "LANWATCH_TRAFFIC_SPIKE_KBPS",
                defaults.traffic_spike_threshold_kbps,
                1.0,
                10_000_000.0,
            ),
            connection_count_threshold: env_parse_u64(
                "LANWATCH_CONNECTION_THRESHOLD",
                defaults.connection_count_threshold,
                0,
                1_000_000,
            ),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes.max(1) * 60)
    }
}

//! Detection rule configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::AlertSeverity;
use crate::config::{DEFAULT_CONNECTION_COUNT_THRESHOLD, DEFAULT_TRAFFIC_SPIKE_THRESHOLD_KBPS};

/// Which detection routine a rule dispatches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    GatewaySpoof,
    UnknownDevice,
    TrafficSpike,
    ExcessiveConnections,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::GatewaySpoof => "gateway_spoof",
            RuleType::UnknownDevice => "unknown_device",
            RuleType::TrafficSpike => "traffic_spike",
            RuleType::ExcessiveConnections => "excessive_connections",
        }
    }
}

/// A configured detection rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRule {
    pub name: String,
    pub rule_type: RuleType,
    pub severity: AlertSeverity,
    pub enabled: bool,
    pub threshold: f64,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    #[serde(skip)]
    pub last_evaluated: Option<DateTime<Utc>>,
}

impl DetectionRule {
    pub fn new(
        name: impl Into<String>,
        rule_type: RuleType,
        severity: AlertSeverity,
        threshold: f64,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            rule_type,
            severity,
            enabled: true,
            threshold,
            interval,
            last_evaluated: None,
        }
    }

    /// A rule is due when enabled and its own interval has elapsed.
    /// A clock that stepped backwards past the last evaluation makes it due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_evaluated {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.interval)
                .unwrap_or(true),
        }
    }
}

/// Explicit partial update of a rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub enabled: Option<bool>,
    pub threshold: Option<f64>,
    #[serde(default, with = "option_duration_secs")]
    pub interval: Option<Duration>,
    pub severity: Option<AlertSeverity>,
}

impl RuleUpdate {
    pub fn apply(&self, rule: &mut DetectionRule) {
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(threshold) = self.threshold
            && threshold.is_finite()
        {
            rule.threshold = threshold;
        }
        if let Some(interval) = self.interval
            && !interval.is_zero()
        {
            rule.interval = interval;
        }
        if let Some(severity) = self.severity {
            rule.severity = severity;
        }
    }
}

pub const GATEWAY_SPOOF_RULE: &str = "Gateway MAC spoofing";
pub const UNKNOWN_DEVICE_RULE: &str = "Unknown device";
pub const TRAFFIC_SPIKE_RULE: &str = "Traffic spike";
pub const EXCESSIVE_CONNECTIONS_RULE: &str = "Excessive connections";

/// The built-in rule set
pub fn default_rules() -> Vec<DetectionRule> {
    vec![
        DetectionRule::new(
            GATEWAY_SPOOF_RULE,
            RuleType::GatewaySpoof,
            AlertSeverity::Critical,
            0.0,
            Duration::from_secs(5),
        ),
        DetectionRule::new(
            UNKNOWN_DEVICE_RULE,
            RuleType::UnknownDevice,
            AlertSeverity::Warning,
            0.0,
            Duration::from_secs(30),
        ),
        DetectionRule::new(
            TRAFFIC_SPIKE_RULE,
            RuleType::TrafficSpike,
            AlertSeverity::Warning,
            DEFAULT_TRAFFIC_SPIKE_THRESHOLD_KBPS,
            Duration::from_secs(10),
        ),
        DetectionRule::new(
            EXCESSIVE_CONNECTIONS_RULE,
            RuleType::ExcessiveConnections,
            AlertSeverity::Warning,
            DEFAULT_CONNECTION_COUNT_THRESHOLD as f64,
            Duration::from_secs(5),
        ),
    ]
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

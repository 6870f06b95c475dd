//! Alert types for security detection
//!
//! Defines alert categories and severity levels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// Types of alerts the detector can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Gateway answered with a different hardware address for long enough
    GatewaySpoof,
    /// Hardware address never seen before came online
    UnknownDevice,
    /// More devices online than a hotspot normally carries
    HotspotDeviceLimit,
    /// Upload throughput above threshold
    UploadSpike,
    /// Download throughput above threshold
    DownloadSpike,
    /// Connection count far above the rolling baseline
    ExcessiveConnections,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::GatewaySpoof => "GATEWAY_SPOOF",
            AlertKind::UnknownDevice => "UNKNOWN_DEVICE",
            AlertKind::HotspotDeviceLimit => "HOTSPOT_DEVICE_LIMIT",
            AlertKind::UploadSpike => "UPLOAD_SPIKE",
            AlertKind::DownloadSpike => "DOWNLOAD_SPIKE",
            AlertKind::ExcessiveConnections => "EXCESSIVE_CONNECTIONS",
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertKind::GatewaySpoof => AlertSeverity::Critical,
            AlertKind::UnknownDevice => AlertSeverity::Warning,
            AlertKind::HotspotDeviceLimit => AlertSeverity::Warning,
            AlertKind::UploadSpike => AlertSeverity::Warning,
            AlertKind::DownloadSpike => AlertSeverity::Warning,
            AlertKind::ExcessiveConnections => AlertSeverity::Warning,
        }
    }
}

/// A raised alert. Only `is_read` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_mac: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl SecurityAlert {
    pub fn new(
        kind: AlertKind,
        title: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            title: title.into(),
            description: description.into(),
            source_ip: None,
            source_mac: None,
            timestamp,
            is_read: false,
        }
    }

    pub fn with_source(mut self, ip: impl Into<String>, mac: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self.source_mac = Some(mac.into());
        self
    }

    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }
}

//! Upload/download spike detection

use chrono::{DateTime, Utc};

use super::types::{AlertKind, SecurityAlert};
use crate::models::BandwidthSample;

/// Alerts independently for upload and download above `threshold_kbps`.
/// No suppression beyond the rule's own interval.
pub fn traffic_spike_alerts(
    sample: BandwidthSample,
    threshold_kbps: f64,
    now: DateTime<Utc>,
) -> Vec<SecurityAlert> {
    let mut alerts = Vec::new();

    if sample.upload_kbps > threshold_kbps {
        alerts.push(SecurityAlert::new(
            AlertKind::UploadSpike,
            "Upload traffic spike",
            format!(
                "Upload at {:.0} kbps exceeds the {:.0} kbps threshold",
                sample.upload_kbps, threshold_kbps
            ),
            now,
        ));
    }

    if sample.download_kbps > threshold_kbps {
        alerts.push(SecurityAlert::new(
            AlertKind::DownloadSpike,
            "Download traffic spike",
            format!(
                "Download at {:.0} kbps exceeds the {:.0} kbps threshold",
                sample.download_kbps, threshold_kbps
            ),
            now,
        ));
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_and_download_alert_independently() {
        let now = Utc::now();
        let quiet = BandwidthSample {
            upload_kbps: 100.0,
            download_kbps: 4_999.0,
        };
        assert!(traffic_spike_alerts(quiet, 5_000.0, now).is_empty());

        let upload_only = BandwidthSample {
            upload_kbps: 6_000.0,
            download_kbps: 10.0,
        };
        let alerts = traffic_spike_alerts(upload_only, 5_000.0, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::UploadSpike);

        let both = BandwidthSample {
            upload_kbps: 6_000.0,
            download_kbps: 9_000.0,
        };
        assert_eq!(traffic_spike_alerts(both, 5_000.0, now).len(), 2);
        // Repeated evaluation alerts again
        assert_eq!(traffic_spike_alerts(both, 5_000.0, now).len(), 2);
    }
}

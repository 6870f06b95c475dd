//! Connection-flood detection over a rolling baseline

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use super::hotspot::NetworkMode;
use super::types::{AlertKind, SecurityAlert};
use crate::config::{
    CONNECTION_ALERT_DEBOUNCE_SECS, CONNECTION_MIN_SAMPLES, CONNECTION_MULTIPLIER,
    CONNECTION_MULTIPLIER_HOTSPOT, CONNECTION_WINDOW_SECS,
};

pub fn flood_multiplier(mode: NetworkMode) -> f64 {
    match mode {
        NetworkMode::Normal => CONNECTION_MULTIPLIER,
        NetworkMode::Hotspot => CONNECTION_MULTIPLIER_HOTSPOT,
    }
}

/// Time-windowed connection-count samples plus the debounce clock
#[derive(Debug, Clone)]
pub struct ConnectionBaseline {
    samples: VecDeque<(DateTime<Utc>, u64)>,
    window: Duration,
    min_samples: usize,
    debounce: Duration,
    last_alert: Option<DateTime<Utc>>,
}

impl Default for ConnectionBaseline {
    fn default() -> Self {
        Self {
            samples: VecDeque::new(),
            window: Duration::seconds(CONNECTION_WINDOW_SECS),
            min_samples: CONNECTION_MIN_SAMPLES,
            debounce: Duration::seconds(CONNECTION_ALERT_DEBOUNCE_SECS),
            last_alert: None,
        }
    }
}

impl ConnectionBaseline {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().map(|(_, count)| count).sum();
        Some(sum as f64 / self.samples.len() as f64)
    }

    /// Forgets samples and the debounce clock (network switched)
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_alert = None;
    }

    /// Records `count` and returns an alert when it floods the baseline.
    ///
    /// `floor` is an absolute count below which nothing counts as a flood.
    pub fn observe(
        &mut self,
        count: u64,
        now: DateTime<Utc>,
        mode: NetworkMode,
        floor: u64,
    ) -> Option<SecurityAlert> {
        self.samples.push_back((now, count));
        while let Some((at, _)) = self.samples.front() {
            if now - *at > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        if self.samples.len() < self.min_samples {
            return None;
        }

        if let Some(last) = self.last_alert
            && now - last < self.debounce
        {
            return None;
        }

        let average = self.average()?;
        let limit = average * flood_multiplier(mode);
        if (count as f64) <= limit || count <= floor {
            return None;
        }

        self.last_alert = Some(now);
        Some(SecurityAlert::new(
            AlertKind::ExcessiveConnections,
            "Excessive network connections",
            format!(
                "{} open connections against a {:.1} average over the last {}s",
                count,
                average,
                self.window.num_seconds()
            ),
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn needs_minimum_samples_before_alerting() {
        let mut baseline = ConnectionBaseline::default();
        for i in 0..8 {
            assert!(baseline.observe(10, at(i), NetworkMode::Normal, 0).is_none());
        }
        // Ninth sample is a huge spike but the window is still warming up
        assert!(baseline.observe(1_000, at(8), NetworkMode::Normal, 0).is_none());
        assert!(baseline.observe(1_000, at(9), NetworkMode::Normal, 0).is_some());
    }

    #[test]
    fn debounces_for_thirty_seconds() {
        let mut baseline = ConnectionBaseline::default();
        for i in 0..10 {
            baseline.observe(10, at(i), NetworkMode::Normal, 0);
        }

        assert!(baseline.observe(200, at(10), NetworkMode::Normal, 0).is_some());
        assert!(baseline.observe(2_000, at(20), NetworkMode::Normal, 0).is_none());
        assert!(baseline.observe(20_000, at(39), NetworkMode::Normal, 0).is_none());
        assert!(baseline.observe(200_000, at(40), NetworkMode::Normal, 0).is_some());
    }

    #[test]
    fn drops_samples_older_than_window() {
        let mut baseline = ConnectionBaseline::default();
        for i in 0..10 {
            baseline.observe(10, at(i), NetworkMode::Normal, 0);
        }
        baseline.observe(10, at(100), NetworkMode::Normal, 0);
        assert_eq!(baseline.len(), 1);
    }

    #[test]
    fn hotspot_uses_wider_multiplier_and_floor_applies() {
        let mut normal = ConnectionBaseline::default();
        let mut hotspot = ConnectionBaseline::default();
        for i in 0..10 {
            normal.observe(10, at(i), NetworkMode::Normal, 0);
            hotspot.observe(10, at(i), NetworkMode::Hotspot, 0);
        }
        // average with the spike included: (100 + 25) / 11 ~= 11.4
        assert!(normal.observe(25, at(10), NetworkMode::Normal, 0).is_some());
        assert!(hotspot.observe(25, at(10), NetworkMode::Hotspot, 0).is_none());

        let mut floored = ConnectionBaseline::default();
        for i in 0..10 {
            floored.observe(10, at(i), NetworkMode::Normal, 50);
        }
        assert!(floored.observe(40, at(10), NetworkMode::Normal, 50).is_none());
    }
}

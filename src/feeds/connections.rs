//! Connection-count sampling from the OS socket tables

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use super::FeedHub;
use crate::models::ConnectionStats;
use crate::shutdown::Shutdown;

/// Produces one connection-count sample. Implementations may block.
pub trait ConnectionSampler: Send + Sync {
    fn sample(&self) -> Result<ConnectionStats>;
}

/// Reads `/proc/net/{tcp,tcp6,udp,udp6}`
#[derive(Debug, Clone)]
pub struct ProcNetConnectionSampler {
    root: std::path::PathBuf,
}

impl Default for ProcNetConnectionSampler {
    fn default() -> Self {
        Self {
            root: std::path::PathBuf::from("/proc/net"),
        }
    }
}

impl ProcNetConnectionSampler {
    pub fn with_root(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_table(&self, name: &str) -> Result<Option<String>> {
        let path = self.root.join(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            // tcp6/udp6 are absent when IPv6 is disabled
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

impl ConnectionSampler for ProcNetConnectionSampler {
    fn sample(&self) -> Result<ConnectionStats> {
        let mut stats = ConnectionStats::default();

        for name in ["tcp", "tcp6"] {
            if let Some(content) = self.read_table(name)? {
                let (total, established) = parse_proc_net_sockets(&content);
                stats.tcp += total;
                stats.established += established;
            }
        }
        for name in ["udp", "udp6"] {
            if let Some(content) = self.read_table(name)? {
                stats.udp += parse_proc_net_sockets(&content).0;
            }
        }

        stats.total = stats.tcp + stats.udp;
        Ok(stats)
    }
}

/// Counts socket rows and rows in state `01` (TCP established)
pub fn parse_proc_net_sockets(content: &str) -> (u64, u64) {
    let mut total = 0;
    let mut established = 0;
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        total += 1;
        if fields[3] == "01" {
            established += 1;
        }
    }
    (total, established)
}

/// Samples on `interval` and publishes into `hub` until shutdown
pub async fn run_connection_sampler(
    sampler: Arc<dyn ConnectionSampler>,
    hub: FeedHub,
    interval: Duration,
    shutdown: Shutdown,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sampler = Arc::clone(&sampler);
        match tokio::task::spawn_blocking(move || sampler.sample()).await {
            Ok(Ok(stats)) => {
                failures = 0;
                hub.publish_stats(stats);
            }
            Ok(Err(e)) => {
                failures = failures.saturating_add(1);
                // Warn once per failure streak
                if failures == 1 {
                    tracing::warn!("Connection sampling failed: {:#}", e);
                } else {
                    tracing::debug!("Connection sampling failed ({}x): {:#}", failures, e);
                }
            }
            Err(e) => tracing::warn!("Connection sampler task failed: {}", e),
        }
    }

    tracing::debug!("Connection sampler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::ConnectionFeed;

    const PROC_NET_TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000   999        0 20611 1
   1: 0A01A8C0:9C40 22D8B85D:01BB 01 00000000:00000000 02:000A3D6C 00000000  1000        0 41235 2
   2: 0A01A8C0:9C42 22D8B85D:01BB 01 00000000:00000000 02:000A3D6C 00000000  1000        0 41236 2
   3: 0A01A8C0:A1B0 5DB8D822:01BB 06 00000000:00000000 03:00000C8E 00000000     0        0 0 3
";

    #[test]
    fn counts_rows_and_established() {
        assert_eq!(parse_proc_net_sockets(PROC_NET_TCP), (4, 2));
        assert_eq!(parse_proc_net_sockets(""), (0, 0));
    }

    #[test]
    fn samples_a_directory_of_tables() {
        let dir = std::env::temp_dir().join(format!("lanwatch-procnet-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tcp"), PROC_NET_TCP).unwrap();
        std::fs::write(
            dir.join("udp"),
            "  sl  local_address rem_address   st\n   0: 00000000:0044 00000000:0000 07 0\n",
        )
        .unwrap();

        let stats = ProcNetConnectionSampler::with_root(&dir).sample().unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(stats.tcp, 4);
        assert_eq!(stats.udp, 1);
        assert_eq!(stats.established, 2);
        assert_eq!(stats.total, 5);
    }

    struct Fixed(u64);

    impl ConnectionSampler for Fixed {
        fn sample(&self) -> Result<ConnectionStats> {
            Ok(ConnectionStats {
                total: self.0,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn sampler_publishes_until_shutdown() {
        let hub = FeedHub::new();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(run_connection_sampler(
            Arc::new(Fixed(42)),
            hub.clone(),
            Duration::from_millis(10),
            shutdown.clone(),
        ));

        let mut rx = hub.watch_stats();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.latest_stats().map(|s| s.total), Some(42));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}

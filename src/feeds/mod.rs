//! Connection and bandwidth feeds
//!
//! Samplers publish into a [`FeedHub`]; the detector only reads the latest value.

mod connections;

pub use connections::{
    ConnectionSampler, ProcNetConnectionSampler, parse_proc_net_sockets, run_connection_sampler,
};

use std::sync::Arc;
use tokio::sync::watch;

use crate::models::{BandwidthSample, ConnectionStats};

pub trait ConnectionFeed: Send + Sync {
    fn latest_stats(&self) -> Option<ConnectionStats>;
}

pub trait BandwidthFeed: Send + Sync {
    fn latest_speeds(&self) -> Option<BandwidthSample>;
}

/// Latest-value holder for both feeds
#[derive(Debug, Clone)]
pub struct FeedHub {
    connections: Arc<watch::Sender<Option<ConnectionStats>>>,
    bandwidth: Arc<watch::Sender<Option<BandwidthSample>>>,
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedHub {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(watch::Sender::new(None)),
            bandwidth: Arc::new(watch::Sender::new(None)),
        }
    }

    pub fn publish_stats(&self, stats: ConnectionStats) {
        self.connections.send_replace(Some(stats));
    }

    /// Entry point for an external bandwidth sampler
    pub fn publish_speeds(&self, sample: BandwidthSample) {
        self.bandwidth.send_replace(Some(sample));
    }

    pub fn watch_stats(&self) -> watch::Receiver<Option<ConnectionStats>> {
        self.connections.subscribe()
    }

    pub fn watch_speeds(&self) -> watch::Receiver<Option<BandwidthSample>> {
        self.bandwidth.subscribe()
    }
}

impl ConnectionFeed for FeedHub {
    fn latest_stats(&self) -> Option<ConnectionStats> {
        *self.connections.borrow()
    }
}

impl BandwidthFeed for FeedHub {
    fn latest_speeds(&self) -> Option<BandwidthSample> {
        *self.bandwidth.borrow()
    }
}

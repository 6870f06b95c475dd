//! ICMP echo reachability probe

use anyhow::{Context, Result};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};

/// Boxed future returned by [`ReachabilityProbe`]
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Answers "does this address respond right now?"
pub trait ReachabilityProbe: Send + Sync {
    fn is_reachable(&self, ip: Ipv4Addr, timeout: Duration) -> ProbeFuture<'_>;
}

/// Single echo request per address through a shared ICMP socket
pub struct IcmpProbe {
    client: Client,
    next_id: AtomicU16,
}

impl IcmpProbe {
    /// Opens the ICMP socket. Fails without raw/datagram ICMP permission.
    pub fn new() -> Result<Self> {
        let client = Client::new(&Config::default()).context("Failed to open ICMP socket")?;
        Ok(Self {
            client,
            next_id: AtomicU16::new(seed_id()),
        })
    }
}

impl ReachabilityProbe for IcmpProbe {
    fn is_reachable(&self, ip: Ipv4Addr, timeout: Duration) -> ProbeFuture<'_> {
        Box::pin(async move {
            let payload = [0u8; 56];
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let mut pinger = self.client.pinger(IpAddr::V4(ip), PingIdentifier(id)).await;
            pinger.timeout(timeout);
            pinger.ping(PingSequence(0), &payload).await.is_ok()
        })
    }
}

fn seed_id() -> u16 {
    use std::time::SystemTime;
    let duration = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    ((duration.as_nanos() % 0xFFFF) as u16).wrapping_add(1)
}

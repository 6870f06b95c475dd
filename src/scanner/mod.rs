//! Scanner module - reachability probing and the bounded host prober

mod icmp;
mod prober;

pub use icmp::{IcmpProbe, ProbeFuture, ReachabilityProbe};
pub use prober::{HostProber, ProbeOutcome, ProberConfig};

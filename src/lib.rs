//! lanwatch - LAN device discovery and security heuristics
//!
//! This crate provides:
//! - Subnet enumeration and bounded-concurrency host probing
//! - Neighbor-table validation, vendor lookup and device classification
//! - A device registry with scan sessions and online/offline tracking
//! - Connection and bandwidth feeds
//! - A security detector (gateway spoofing, unknown devices, traffic
//!   spikes, connection floods)
//! - Background monitoring with an in-process event bus

pub mod alerts;
pub mod app;
pub mod cli;
pub mod config;
pub mod feeds;
pub mod inventory;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod network;
pub mod scanner;
pub mod shutdown;
pub mod store;

pub use alerts::{
    AlertKind, AlertSeverity, DetectionRule, DetectorInputs, NetworkMode, NetworkModeClassifier,
    RuleUpdate, SecurityAlert, SecurityDetector,
};
pub use app::{execute_command, run};
pub use cli::{CliCommand, parse_cli_args};
pub use config::MonitorSettings;
pub use feeds::{BandwidthFeed, ConnectionFeed, FeedHub};
pub use inventory::{DeviceRegistry, ScanOrchestrator, ScanReport, ScanSession};
pub use models::*;
pub use monitor::{EventBus, MonitorComponents, MonitorStatus, NetworkEvent, NetworkMonitor};
pub use network::{
    DeviceClass, DeviceClassifier, InterfaceProvider, InvalidAddressError, NeighborTable,
    NameResolver, enumerate_hosts, enumerate_hosts_str,
};
pub use scanner::{HostProber, ProbeOutcome, ProberConfig, ReachabilityProbe};
pub use shutdown::Shutdown;
pub use store::{AlertDispatcher, AlertSink, DeviceStore, MemoryStore};

// Re-export logging macros for use across crate
pub use crate::logging::macros;

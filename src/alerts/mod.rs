//! Security detection module
//!
//! Alert types, detection rules and the four stateful detection routines

pub mod connections;
pub mod detector;
pub mod gateway;
pub mod hotspot;
pub mod rules;
pub mod traffic;
pub mod types;
pub mod unknown;

pub use connections::ConnectionBaseline;
pub use detector::{DetectorInputs, SecurityDetector};
pub use gateway::{GatewayObservation, GatewayPhase, GatewaySpoofState, transition};
pub use hotspot::{HotspotSubnetClassifier, NetworkMode, NetworkModeClassifier};
pub use rules::{DetectionRule, RuleType, RuleUpdate, default_rules};
pub use types::{AlertKind, AlertSeverity, SecurityAlert};
pub use unknown::UnknownDeviceTracker;

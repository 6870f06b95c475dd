//! Device inventory - the registry and the scan sessions that feed it

mod registry;
mod session;

pub use registry::{DeviceRegistry, RecordedDevice};
pub use session::{NetworkChange, ScanOrchestrator, ScanReport, ScanSession};

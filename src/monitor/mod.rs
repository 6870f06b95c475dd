//! Real-time network monitoring module
//!
//! Provides the event bus and the background monitor loops

pub mod events;
pub mod service;

pub use events::*;
pub use service::*;

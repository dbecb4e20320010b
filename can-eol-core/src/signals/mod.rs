//! Signal definitions and the signal map
//!
//! This module contains the in-memory signal map and the parser for the
//! declarative signal document.

pub mod database;
pub mod source;

// Re-export key types for convenience
pub use database::{DecodeType, MapStats, SignalDefinition, SignalMap};
pub use source::{parse_can_id, SignalDocument};

//! CAN EOL Core Library
//!
//! Signal decoding and real-time validation for a vehicle end-of-line test
//! bench. Raw CAN frames are decoded into named signals through a declarative
//! signal map, fed to a validator that keeps the history of a test run, and
//! published to a latest-value store for live observers.
//!
//! # Architecture
//!
//! - [`SignalMap`]: CAN ID -> bit-field signal definitions (immutable)
//! - [`FrameDecoder`]: payload bytes -> named values
//! - [`RuleSet`] / [`SignalValidator`]: pass/fail rules over a run's history
//! - [`StateStore`]: thread-safe latest values with change notification
//! - [`Pipeline`]: background decode/validate loop with cooperative shutdown
//! - [`harness`]: wiring-harness continuity cases over a digital I/O card
//! - [`uds`]: UDS request frames (session, security access, IO control)
//!
//! The library does NOT talk to CAN or I/O hardware, parse UDS responses or
//! format reports. Those are collaborators of the application layer.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_eol_core::{frame_queue, CanFrame, Pipeline, PipelineConfig, RuleSet, SignalMap, StateStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let signal_map = Arc::new(SignalMap::load(Path::new("can_decode.yaml")).unwrap());
//! let rules = Arc::new(RuleSet::load(Path::new("can_validation.yaml")).unwrap());
//! let config = PipelineConfig::new();
//! let store = Arc::new(StateStore::with_priority_signals(config.priority_signals.clone()));
//!
//! let (sender, queue) = frame_queue(config.queue_capacity);
//! let mut pipeline = Pipeline::start(queue, signal_map, rules, store, &config).unwrap();
//!
//! // The CAN receiver pushes frames
//! sender.try_send(CanFrame::new(0x1F1, vec![0x02, 0x7D]));
//!
//! pipeline.stop().unwrap();
//! for result in pipeline.test_results().unwrap() {
//!     println!("{}: {}", result.rule_name, result.reason);
//! }
//! ```

// Public modules
pub mod config;
pub mod decoder;
pub mod frame;
pub mod harness;
pub mod pipeline;
pub mod rules;
pub mod signals;
pub mod state_store;
pub mod types;
pub mod uds;
pub mod validator;

// Re-export main types for convenience
pub use config::{DocumentFormat, PipelineConfig};
pub use decoder::FrameDecoder;
pub use frame::{dlc_to_len, len_to_dlc, CanFrame};
pub use pipeline::{frame_queue, FrameQueue, FrameSender, FrameSource, Pipeline, PipelineStats};
pub use rules::{RuleCheck, RuleKind, RuleSet, ValidationRule};
pub use signals::{DecodeType, MapStats, SignalDefinition, SignalMap};
pub use state_store::{StateChange, StateStore};
pub use types::{DecodedFrame, Error, Result, SignalValue};
pub use uds::{FrameSink, UdsClient, UdsTimings};
pub use validator::{SignalValidator, TestResult, TestSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

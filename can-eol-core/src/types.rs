//! Core types for the EOL signal core
//!
//! This module defines the fundamental types that flow through the decode and
//! validation pipeline: raw CAN frames, decoded signal values and the error type
//! shared by every module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Decoded signals of one frame, keyed by signal name
pub type DecodedFrame = BTreeMap<String, SignalValue>;

/// Errors that can occur in the core library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed configuration. Fatal to starting a test run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline is still running, stop it before reading results")]
    PipelineRunning,

    #[error("Pipeline worker did not exit within {0:?}")]
    StopTimeout(Duration),

    #[error("Pipeline worker panicked")]
    WorkerPanicked,

    #[error("Digital IO error: {0}")]
    DigitalIo(String),

    /// A diagnostic request that cannot be put in a frame
    #[error("Invalid UDS request: {0}")]
    InvalidRequest(String),

    /// The CAN transport refused a frame
    #[error("CAN transmit failed: {0}")]
    Transmit(String),
}

impl Error {
    /// True for failures that come from loading configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::UnsupportedFormat(_)
        )
    }
}

/// A decoded signal value
///
/// State-encoded fields decode to a [`SignalValue::Label`], linear fields to a
/// [`SignalValue::Number`] and `raw` fields keep the extracted integer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// Raw integer (no decoding applied)
    RawInt(i64),
    /// Floating-point value after `raw * a + b`
    Number(f64),
    /// Label from a value table, or `UNKNOWN(n)`
    Label(String),
}

impl SignalValue {
    /// Numeric view of the value. Labels have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::RawInt(v) => Some(*v as f64),
            SignalValue::Number(v) => Some(*v),
            SignalValue::Label(_) => None,
        }
    }

    /// Label view of the value
    pub fn as_label(&self) -> Option<&str> {
        match self {
            SignalValue::Label(s) => Some(s),
            _ => None,
        }
    }

    /// Loose comparison used by rule evaluation.
    ///
    /// Numbers compare numerically across `RawInt` and `Number` (3 matches 3.0),
    /// labels compare by string. A label never matches a number.
    pub fn matches(&self, other: &SignalValue) -> bool {
        match (self, other) {
            (SignalValue::Label(a), SignalValue::Label(b)) => a == b,
            (SignalValue::Label(_), _) | (_, SignalValue::Label(_)) => false,
            _ => self.as_f64() == other.as_f64(),
        }
    }

    // -0.0 and 0.0 must hash and compare the same
    fn float_bits(v: f64) -> u64 {
        if v == 0.0 {
            0.0f64.to_bits()
        } else {
            v.to_bits()
        }
    }
}

// Strict equality: same variant and same value. Floats compare by bit pattern so
// that values can live in hash sets.
impl PartialEq for SignalValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SignalValue::RawInt(a), SignalValue::RawInt(b)) => a == b,
            (SignalValue::Number(a), SignalValue::Number(b)) => {
                Self::float_bits(*a) == Self::float_bits(*b)
            }
            (SignalValue::Label(a), SignalValue::Label(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SignalValue {}

impl Hash for SignalValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            SignalValue::RawInt(v) => v.hash(state),
            SignalValue::Number(v) => Self::float_bits(*v).hash(state),
            SignalValue::Label(s) => s.hash(state),
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::RawInt(v) => write!(f, "{}", v),
            SignalValue::Number(v) => write!(f, "{}", v),
            SignalValue::Label(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for SignalValue {
    fn from(s: &str) -> Self {
        SignalValue::Label(s.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(s: String) -> Self {
        SignalValue::Label(s)
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Number(v)
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::RawInt(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_signal_value_conversions() {
        assert_eq!(SignalValue::RawInt(42).as_f64(), Some(42.0));
        assert_eq!(SignalValue::Number(2.5).as_f64(), Some(2.5));
        assert_eq!(SignalValue::from("RUN").as_f64(), None);
        assert_eq!(SignalValue::from("RUN").as_label(), Some("RUN"));
    }

    #[test]
    fn test_signal_value_display() {
        assert_eq!(format!("{}", SignalValue::RawInt(42)), "42");
        assert_eq!(format!("{}", SignalValue::Number(2.5)), "2.5");
        assert_eq!(format!("{}", SignalValue::from("OFF")), "OFF");
    }

    #[test]
    fn test_loose_matching() {
        assert!(SignalValue::RawInt(3).matches(&SignalValue::Number(3.0)));
        assert!(SignalValue::from("RUN").matches(&SignalValue::from("RUN")));
        assert!(!SignalValue::from("3").matches(&SignalValue::RawInt(3)));
        assert!(!SignalValue::Number(3.1).matches(&SignalValue::RawInt(3)));
    }

    #[test]
    fn test_strict_equality_and_hashing() {
        assert_ne!(SignalValue::RawInt(3), SignalValue::Number(3.0));
        assert_eq!(SignalValue::Number(0.0), SignalValue::Number(-0.0));

        let mut set = HashSet::new();
        set.insert(SignalValue::Number(0.0));
        set.insert(SignalValue::Number(-0.0));
        set.insert(SignalValue::from("OFF"));
        set.insert(SignalValue::from("OFF"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_untagged_deserialization() {
        let values: Vec<SignalValue> = serde_json::from_str(r#"["RUN", 3, 2.5]"#).unwrap();
        assert_eq!(
            values,
            vec![
                SignalValue::from("RUN"),
                SignalValue::RawInt(3),
                SignalValue::Number(2.5)
            ]
        );
    }

    #[test]
    fn test_configuration_errors_are_flagged() {
        assert!(Error::Configuration("bad".into()).is_configuration());
        assert!(!Error::PipelineRunning.is_configuration());
    }

    #[test]
    fn test_io_errors_are_not_configuration() {
        // Thread spawn failures surface as Io; unreadable documents as Configuration
        let spawn = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "no threads"));
        assert!(!spawn.is_configuration());
        assert!(Error::UnsupportedFormat("a.ini".into()).is_configuration());
    }
}

//! Signal map documents
//!
//! Parses the declarative signal document (YAML or JSON) and converts it into
//! the internal [`SignalMap`].
//!
//! ```yaml
//! can_signals:
//!   - can_id: 0x1F1
//!     parameters:
//!       - name: Vehicle_Power_Mode
//!         start_byte: 0
//!         start_bit: 0
//!         bit_length: 2
//!         decode_type: stateEncoded
//!         values: {0: OFF, 1: ACC, 2: RUN}
//!       - name: Battery_Voltage
//!         start_byte: 1
//!         bit_length: 8
//!         decode_type: linear
//!         calculation: {a: 0.1, b: 0.0}
//! ```

use super::database::{DecodeType, SignalDefinition, SignalMap};
use crate::config::{load_document, DocumentFormat};
use crate::types::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level signal document
#[derive(Debug, Clone, Deserialize)]
pub struct SignalDocument {
    #[serde(default)]
    pub can_signals: Vec<SignalGroup>,
}

/// One CAN ID and its parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SignalGroup {
    #[serde(deserialize_with = "deserialize_can_id")]
    pub can_id: u32,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
}

/// One signal as written in the document
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    pub start_byte: usize,
    #[serde(default)]
    pub start_bit: u8,
    pub bit_length: u8,
    pub decode_type: DecodeType,
    #[serde(default)]
    pub values: BTreeMap<u64, String>,
    #[serde(default)]
    pub calculation: Calculation,
}

/// Linear scaling coefficients
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Calculation {
    #[serde(default = "default_scale")]
    pub a: f64,
    #[serde(default)]
    pub b: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Calculation {
    fn default() -> Self {
        Self { a: 1.0, b: 0.0 }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CanIdRepr {
    Number(u32),
    Text(String),
}

/// Parse a CAN ID written as a number, a decimal string or a `0x` hex string
pub fn parse_can_id(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn deserialize_can_id<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match CanIdRepr::deserialize(deserializer)? {
        CanIdRepr::Number(id) => Ok(id),
        CanIdRepr::Text(text) => parse_can_id(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid CAN ID '{}'", text))),
    }
}

impl From<ParameterEntry> for SignalDefinition {
    fn from(entry: ParameterEntry) -> Self {
        SignalDefinition {
            name: entry.name,
            start_byte: entry.start_byte,
            start_bit: entry.start_bit,
            bit_length: entry.bit_length,
            decode_type: entry.decode_type,
            value_table: entry.values,
            scale_a: entry.calculation.a,
            scale_b: entry.calculation.b,
        }
    }
}

/// Convert a parsed document into a signal map
pub fn build_signal_map(document: SignalDocument) -> Result<SignalMap> {
    let mut map = SignalMap::new();
    for group in document.can_signals {
        let signals = group.parameters.into_iter().map(SignalDefinition::from).collect();
        map.add_message(group.can_id, signals)?;
    }

    let stats = map.stats();
    log::info!(
        "Signal map loaded: {} CAN IDs, {} signals",
        stats.num_messages,
        stats.num_signals
    );
    Ok(map)
}

impl SignalMap {
    /// Load a signal map from a YAML or JSON file
    pub fn load(path: &Path) -> Result<SignalMap> {
        log::info!("Loading signal map: {:?}", path);
        let document: SignalDocument = load_document(path)?;
        build_signal_map(document).map_err(|e| match e {
            Error::Configuration(msg) => Error::Configuration(format!("{:?}: {}", path, msg)),
            other => other,
        })
    }

    /// Parse a signal map from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<SignalMap> {
        build_signal_map(DocumentFormat::Yaml.parse(content)?)
    }

    /// Parse a signal map from a JSON string
    pub fn from_json_str(content: &str) -> Result<SignalMap> {
        build_signal_map(DocumentFormat::Json.parse(content)?)
    }
}

//! Signal map
//!
//! Immutable mapping from CAN identifier to the ordered list of signal
//! definitions registered for it. Built once, then shared by reference.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How the raw bit field of a signal is turned into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeType {
    /// Raw integer looked up in the value table
    #[serde(
        rename = "stateEncoded",
        alias = "state_encoded",
        alias = "state-encoded",
        alias = "stateencode"
    )]
    StateEncoded,
    /// `raw * a + b`
    #[serde(rename = "linear")]
    Linear,
    /// Raw integer, no conversion
    #[serde(rename = "raw")]
    Raw,
}

/// A CAN signal definition
///
/// The field lies entirely within the byte at `start_byte`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    /// Signal name, unique within one CAN ID
    pub name: String,
    /// Byte of the payload holding the field
    pub start_byte: usize,
    /// Bit offset inside that byte (0 = LSB)
    pub start_bit: u8,
    /// Field width in bits, 1..=8
    pub bit_length: u8,
    /// Decoding applied to the raw field
    pub decode_type: DecodeType,
    /// Raw value -> label (state-encoded only)
    pub value_table: BTreeMap<u64, String>,
    /// Scale factor (linear only)
    pub scale_a: f64,
    /// Offset (linear only)
    pub scale_b: f64,
}

impl SignalDefinition {
    /// Create a state-encoded definition
    pub fn state_encoded<I, S>(
        name: impl Into<String>,
        start_byte: usize,
        start_bit: u8,
        bit_length: u8,
        table: I,
    ) -> Self
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            start_byte,
            start_bit,
            bit_length,
            decode_type: DecodeType::StateEncoded,
            value_table: table.into_iter().map(|(k, v)| (k, v.into())).collect(),
            scale_a: 1.0,
            scale_b: 0.0,
        }
    }

    /// Create a linear definition
    pub fn linear(
        name: impl Into<String>,
        start_byte: usize,
        start_bit: u8,
        bit_length: u8,
        scale_a: f64,
        scale_b: f64,
    ) -> Self {
        Self {
            name: name.into(),
            start_byte,
            start_bit,
            bit_length,
            decode_type: DecodeType::Linear,
            value_table: BTreeMap::new(),
            scale_a,
            scale_b,
        }
    }

    /// Create a raw definition
    pub fn raw(name: impl Into<String>, start_byte: usize, start_bit: u8, bit_length: u8) -> Self {
        Self {
            name: name.into(),
            start_byte,
            start_bit,
            bit_length,
            decode_type: DecodeType::Raw,
            value_table: BTreeMap::new(),
            scale_a: 1.0,
            scale_b: 0.0,
        }
    }

    /// Check the bit layout: the field must fit inside a single byte
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Configuration(
                "Signal definition with an empty name".to_string(),
            ));
        }
        if self.start_bit > 7 {
            return Err(Error::Configuration(format!(
                "Signal '{}': start_bit {} is outside 0..=7",
                self.name, self.start_bit
            )));
        }
        if !(1..=8).contains(&self.bit_length) {
            return Err(Error::Configuration(format!(
                "Signal '{}': bit_length {} is outside 1..=8",
                self.name, self.bit_length
            )));
        }
        if self.start_bit + self.bit_length > 8 {
            return Err(Error::Configuration(format!(
                "Signal '{}': start_bit {} + bit_length {} crosses a byte boundary",
                self.name, self.start_bit, self.bit_length
            )));
        }
        Ok(())
    }

    /// Mask applied after shifting
    pub fn mask(&self) -> u8 {
        ((1u16 << self.bit_length) - 1) as u8
    }
}

/// The signal map: CAN ID -> ordered signal definitions
#[derive(Debug, Clone, Default)]
pub struct SignalMap {
    messages: HashMap<u32, Vec<SignalDefinition>>,
}

impl SignalMap {
    /// Create a new empty signal map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register definitions for a CAN ID
    ///
    /// Definitions are validated first; an invalid one rejects the whole call.
    /// Repeated CAN IDs append to the existing list. A repeated signal name is
    /// kept (the later definition wins at decode time) but logged.
    pub fn add_message(&mut self, can_id: u32, signals: Vec<SignalDefinition>) -> Result<()> {
        for signal in &signals {
            signal.validate().map_err(|e| match e {
                Error::Configuration(msg) => {
                    Error::Configuration(format!("CAN ID 0x{:X}: {}", can_id, msg))
                }
                other => other,
            })?;
        }

        let entry = self.messages.entry(can_id).or_default();
        for signal in signals {
            if entry.iter().any(|s| s.name == signal.name) {
                log::warn!(
                    "Duplicate signal '{}' for CAN ID 0x{:X}, later definition wins",
                    signal.name,
                    can_id
                );
            }
            entry.push(signal);
        }
        Ok(())
    }

    /// Definitions registered for a CAN ID
    pub fn get(&self, can_id: u32) -> Option<&[SignalDefinition]> {
        self.messages.get(&can_id).map(Vec::as_slice)
    }

    /// True if any definitions are registered for the CAN ID
    pub fn contains(&self, can_id: u32) -> bool {
        self.messages.contains_key(&can_id)
    }

    /// Find all CAN IDs carrying a signal with the given name
    pub fn find_signal(&self, signal_name: &str) -> Vec<(u32, &SignalDefinition)> {
        let mut found: Vec<(u32, &SignalDefinition)> = self
            .messages
            .iter()
            .flat_map(|(id, signals)| {
                signals
                    .iter()
                    .filter(|s| s.name == signal_name)
                    .map(move |s| (*id, s))
            })
            .collect();
        found.sort_by_key(|(id, _)| *id);
        found
    }

    /// All CAN IDs in the map, sorted
    pub fn can_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get map statistics
    pub fn stats(&self) -> MapStats {
        MapStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Signal map statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapStats {
    /// Number of distinct CAN IDs
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_mode() -> SignalDefinition {
        SignalDefinition::state_encoded("Vehicle_Power_Mode", 0, 0, 2, [(0, "OFF"), (1, "RUN")])
    }

    #[test]
    fn test_empty_map() {
        let map = SignalMap::new();
        let stats = map.stats();
        assert_eq!(stats.num_messages, 0);
        assert_eq!(stats.num_signals, 0);
        assert!(map.get(0x100).is_none());
    }

    #[test]
    fn test_add_message() {
        let mut map = SignalMap::new();
        map.add_message(
            0x1F1,
            vec![power_mode(), SignalDefinition::linear("Voltage", 1, 0, 8, 0.1, 0.0)],
        )
        .unwrap();

        let stats = map.stats();
        assert_eq!(stats.num_messages, 1);
        assert_eq!(stats.num_signals, 2);

        let signals = map.get(0x1F1).unwrap();
        assert_eq!(signals[0].name, "Vehicle_Power_Mode");
        assert_eq!(signals[1].name, "Voltage");

        let found = map.find_signal("Voltage");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 0x1F1);
    }

    #[test]
    fn test_repeated_can_id_appends() {
        let mut map = SignalMap::new();
        map.add_message(0x10, vec![power_mode()]).unwrap();
        map.add_message(0x10, vec![SignalDefinition::raw("Counter", 1, 0, 4)]).unwrap();
        map.add_message(0x20, vec![SignalDefinition::raw("Other", 0, 0, 8)]).unwrap();

        assert_eq!(map.get(0x10).unwrap().len(), 2);
        assert_eq!(map.can_ids(), vec![0x10, 0x20]);
    }

    #[test]
    fn test_layout_validation() {
        assert!(SignalDefinition::raw("ok", 0, 4, 4).validate().is_ok());
        assert!(SignalDefinition::raw("ok", 0, 0, 8).validate().is_ok());
        assert!(SignalDefinition::raw("cross", 0, 5, 4).validate().is_err());
        assert!(SignalDefinition::raw("zero", 0, 0, 0).validate().is_err());
        assert!(SignalDefinition::raw("wide", 0, 0, 9).validate().is_err());
        assert!(SignalDefinition::raw("bit", 0, 8, 1).validate().is_err());
        assert!(SignalDefinition::raw("", 0, 0, 1).validate().is_err());
    }

    #[test]
    fn test_invalid_definition_rejects_message() {
        let mut map = SignalMap::new();
        let result = map.add_message(0x10, vec![power_mode(), SignalDefinition::raw("bad", 0, 6, 4)]);
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(map.is_empty());
    }

    #[test]
    fn test_mask() {
        assert_eq!(SignalDefinition::raw("a", 0, 0, 1).mask(), 0x01);
        assert_eq!(SignalDefinition::raw("a", 0, 0, 3).mask(), 0x07);
        assert_eq!(SignalDefinition::raw("a", 0, 0, 8).mask(), 0xFF);
    }
}

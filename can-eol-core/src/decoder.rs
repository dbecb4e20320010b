//! Frame decoding engine
//!
//! Extracts signal values from raw CAN payloads based on the signal map.
//! Decoding never fails: unknown IDs give an empty result, fields beyond the
//! end of a short payload are omitted and unmapped state values are labelled
//! `UNKNOWN(n)`.

use crate::signals::{DecodeType, SignalDefinition, SignalMap};
use crate::types::{DecodedFrame, SignalValue};
use std::sync::Arc;

/// Frame decoder - turns payload bytes into named signals
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    signal_map: Arc<SignalMap>,
}

impl FrameDecoder {
    /// Create a decoder over a shared signal map
    pub fn new(signal_map: Arc<SignalMap>) -> Self {
        Self { signal_map }
    }

    /// The signal map this decoder reads from
    pub fn signal_map(&self) -> &SignalMap {
        &self.signal_map
    }

    /// Decode every signal registered for `can_id`
    ///
    /// # Returns
    /// * signal name -> decoded value. Empty when the ID is not registered.
    ///
    /// When two definitions share a name the later one overwrites the earlier.
    pub fn decode(&self, can_id: u32, payload: &[u8]) -> DecodedFrame {
        let mut decoded = DecodedFrame::new();

        let Some(signals) = self.signal_map.get(can_id) else {
            log::trace!("Unknown CAN ID: 0x{:X}", can_id);
            return decoded;
        };

        for signal in signals {
            if let Some(value) = Self::decode_signal(payload, signal) {
                decoded.insert(signal.name.clone(), value);
            }
        }

        log::trace!("CAN ID 0x{:X}: decoded {} signals", can_id, decoded.len());
        decoded
    }

    /// Decode a single signal, `None` if its byte is not in the payload
    pub fn decode_signal(payload: &[u8], signal: &SignalDefinition) -> Option<SignalValue> {
        let Some(raw) = Self::extract_bits(payload, signal) else {
            log::trace!(
                "Signal '{}' needs byte {} but payload has {} bytes",
                signal.name,
                signal.start_byte,
                payload.len()
            );
            return None;
        };

        let value = match signal.decode_type {
            DecodeType::StateEncoded => match signal.value_table.get(&(raw as u64)) {
                Some(label) => SignalValue::Label(label.clone()),
                None => SignalValue::Label(format!("UNKNOWN({})", raw)),
            },
            DecodeType::Linear => SignalValue::Number(raw as f64 * signal.scale_a + signal.scale_b),
            DecodeType::Raw => SignalValue::RawInt(raw as i64),
        };
        Some(value)
    }

    /// Extract the raw bit field of a signal
    ///
    /// Takes the byte at `start_byte`, shifts it right by `start_bit` and masks
    /// `bit_length` bits. Fields never span more than one byte.
    pub fn extract_bits(payload: &[u8], signal: &SignalDefinition) -> Option<u8> {
        let byte = *payload.get(signal.start_byte)?;
        Some((byte >> signal.start_bit) & signal.mask())
    }
}

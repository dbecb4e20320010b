//! UDS (ISO 14229) request frames
//!
//! The bench drives the ECU with a handful of single-frame requests sent as
//! CAN-FD frames with bit rate switching to the physical request address.
//! Only the request frames are built here; the transport that puts them on
//! the bus is a [`FrameSink`] and responses are not awaited.
//!
//! Single-frame layout (ISO 15765-2):
//! - payloads up to 7 bytes: `[len, SID, ...]`, padded to 8 bytes
//! - longer payloads (CAN-FD): `[0x00, len, SID, ...]`, padded to the next
//!   valid FD length (at least 16 bytes)

use crate::frame::{len_to_dlc, CanFrame};
use crate::types::{Error, Result};
use automotive_diag::uds::UdsCommand;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Physical request address of the ECU under test
pub const PHYSICAL_REQUEST_ID: u32 = 0x14DA_40F1;

/// Diagnostic session subfunctions
pub const DEFAULT_SESSION: u8 = 0x01;
pub const PROGRAMMING_SESSION: u8 = 0x02;
pub const EXTENDED_SESSION: u8 = 0x03;

/// Security access subfunctions for the default level
pub const REQUEST_SEED: u8 = 0x01;
pub const SEND_KEY: u8 = 0x02;

/// Largest payload of a classic single frame
const CLASSIC_SF_MAX: usize = 7;
/// Largest payload of an escaped CAN-FD single frame
const FD_SF_MAX: usize = 62;
/// Smallest frame used for escaped single frames
const FD_SF_MIN_LEN: usize = 16;

/// Anything that can put a frame on the bus
pub trait FrameSink {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<()>;
}

/// Wrap a UDS payload (SID + parameters) into one single frame
pub fn single_frame(can_id: u32, payload: &[u8]) -> Result<CanFrame> {
    if payload.is_empty() {
        return Err(Error::InvalidRequest("empty payload".to_string()));
    }
    if payload.len() > CLASSIC_SF_MAX {
        return fd_single_frame(can_id, payload);
    }

    let mut data = vec![payload.len() as u8];
    data.extend_from_slice(payload);
    data.resize(8, 0);
    Ok(CanFrame::fd_brs(can_id, data))
}

/// Escaped CAN-FD single frame, padded to a length a DLC can express
fn fd_single_frame(can_id: u32, payload: &[u8]) -> Result<CanFrame> {
    if payload.len() > FD_SF_MAX {
        return Err(Error::InvalidRequest(format!(
            "{} byte payload does not fit a single frame",
            payload.len()
        )));
    }

    let mut data = vec![0x00, payload.len() as u8];
    data.extend_from_slice(payload);

    let mut len = data.len().max(FD_SF_MIN_LEN);
    while len_to_dlc(len).is_none() {
        len += 1;
    }
    data.resize(len, 0);
    Ok(CanFrame::fd_brs(can_id, data))
}

/// 0x10 DiagnosticSessionControl
pub fn diagnostic_session_control(session: u8) -> Result<CanFrame> {
    single_frame(
        PHYSICAL_REQUEST_ID,
        &[UdsCommand::DiagnosticSessionControl.into(), session],
    )
}

/// 0x27 SecurityAccess, seed request
pub fn security_access_request_seed(level: u8) -> Result<CanFrame> {
    single_frame(PHYSICAL_REQUEST_ID, &[UdsCommand::SecurityAccess.into(), level])
}

/// 0x27 SecurityAccess, key for the default level
///
/// Always sent as a CAN-FD escaped single frame.
pub fn security_access_send_key(key: &[u8]) -> Result<CanFrame> {
    if key.is_empty() {
        return Err(Error::InvalidRequest("empty security key".to_string()));
    }
    let mut payload: Vec<u8> = Vec::with_capacity(key.len() + 2);
    payload.push(UdsCommand::SecurityAccess.into());
    payload.push(SEND_KEY);
    payload.extend_from_slice(key);
    fd_single_frame(PHYSICAL_REQUEST_ID, &payload)
}

/// 0x2F InputOutputControlByIdentifier
///
/// `params` holds the control option and its control state.
pub fn io_control(did: u16, params: &[u8]) -> Result<CanFrame> {
    let mut payload: Vec<u8> = vec![UdsCommand::InputOutputControlByIdentifier.into()];
    payload.extend_from_slice(&did.to_be_bytes());
    payload.extend_from_slice(params);
    if payload.len() > CLASSIC_SF_MAX {
        return Err(Error::InvalidRequest(format!(
            "IO control of DID 0x{:04X} takes at most {} parameter bytes",
            did,
            CLASSIC_SF_MAX - 3
        )));
    }
    single_frame(PHYSICAL_REQUEST_ID, &payload)
}

/// Pause after each request, giving the ECU time to act on it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UdsTimings {
    #[serde(default = "default_session_ms")]
    pub session_ms: u64,
    #[serde(default = "default_seed_ms")]
    pub seed_ms: u64,
    #[serde(default = "default_key_ms")]
    pub key_ms: u64,
    #[serde(default = "default_io_ms")]
    pub io_control_ms: u64,
}

fn default_session_ms() -> u64 {
    800
}

fn default_seed_ms() -> u64 {
    200
}

fn default_key_ms() -> u64 {
    2000
}

fn default_io_ms() -> u64 {
    200
}

impl Default for UdsTimings {
    fn default() -> Self {
        Self {
            session_ms: default_session_ms(),
            seed_ms: default_seed_ms(),
            key_ms: default_key_ms(),
            io_control_ms: default_io_ms(),
        }
    }
}

impl UdsTimings {
    /// No pauses at all
    pub fn none() -> Self {
        Self {
            session_ms: 0,
            seed_ms: 0,
            key_ms: 0,
            io_control_ms: 0,
        }
    }
}

/// Sends bench UDS requests through a frame sink
pub struct UdsClient<S: FrameSink> {
    sink: S,
    timings: UdsTimings,
}

impl<S: FrameSink> UdsClient<S> {
    pub fn new(sink: S) -> Self {
        Self::with_timings(sink, UdsTimings::default())
    }

    pub fn with_timings(sink: S, timings: UdsTimings) -> Self {
        Self { sink, timings }
    }

    /// Give the sink back
    pub fn into_inner(self) -> S {
        self.sink
    }

    pub fn diagnostic_session_control(&mut self, session: u8) -> Result<()> {
        let frame = diagnostic_session_control(session)?;
        self.transmit(&frame, self.timings.session_ms)
    }

    pub fn security_access_request_seed(&mut self, level: u8) -> Result<()> {
        let frame = security_access_request_seed(level)?;
        self.transmit(&frame, self.timings.seed_ms)
    }

    pub fn security_access_send_key(&mut self, key: &[u8]) -> Result<()> {
        let frame = security_access_send_key(key)?;
        self.transmit(&frame, self.timings.key_ms)
    }

    pub fn io_control(&mut self, did: u16, params: &[u8]) -> Result<()> {
        let frame = io_control(did, params)?;
        self.transmit(&frame, self.timings.io_control_ms)
    }

    fn transmit(&mut self, frame: &CanFrame, wait_ms: u64) -> Result<()> {
        if let Err(e) = self.sink.send_frame(frame) {
            log::error!("UDS TX to 0x{:X} failed: {}", frame.can_id, e);
            return Err(e);
        }
        log::debug!(
            "TX: ID=0x{:X}, len={}; {:02X?}",
            frame.can_id,
            frame.len(),
            frame.data
        );

        if wait_ms > 0 {
            thread::sleep(Duration::from_millis(wait_ms));
        }
        Ok(())
    }
}

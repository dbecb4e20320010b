//! Recorded trace replay
//!
//! Reads candump text logs, one frame per line:
//!
//! ```text
//! (1436509052.249713) can0 1F1#027D
//! (1436509052.449847) can0 2A0##1112233445566778899AABB
//! ```
//!
//! `ID#DATA` is a classic frame, `ID##<flags>DATA` a CAN FD frame. The
//! timestamp and interface are optional.

use anyhow::{bail, Context, Result};
use can_eol_core::{len_to_dlc, CanFrame};
use std::fs;
use std::path::Path;

/// Parse one trace line
///
/// # Returns
/// * `Ok(None)` for blank lines, comments and remote frames
pub fn parse_line(line: &str) -> Result<Option<CanFrame>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let Some(token) = line.split_whitespace().find(|t| t.contains('#')) else {
        bail!("no ID#DATA field");
    };
    let Some((id, rest)) = token.split_once('#') else {
        bail!("no ID#DATA field");
    };

    let can_id = u32::from_str_radix(id, 16).with_context(|| format!("bad CAN ID '{}'", id))?;
    if can_id > 0x1FFF_FFFF {
        bail!("CAN ID 0x{:X} exceeds 29 bits", can_id);
    }

    if rest.starts_with('R') {
        log::trace!("Skipping remote frame 0x{:X}", can_id);
        return Ok(None);
    }

    match rest.strip_prefix('#') {
        Some(fd) => {
            // First character is the FD flags nibble
            let mut chars = fd.chars();
            if chars.next().map_or(true, |c| !c.is_ascii_hexdigit()) {
                bail!("missing CAN FD flags");
            }
            let data = parse_hex(chars.as_str())?;
            let Some(dlc) = len_to_dlc(data.len()) else {
                bail!("{} bytes is not a valid CAN FD length", data.len());
            };
            Ok(Some(CanFrame::from_dlc(can_id, dlc, &data, true)))
        }
        None => {
            let data = parse_hex(rest)?;
            if data.len() > 8 {
                bail!("{} bytes in a classic CAN frame", data.len());
            }
            Ok(Some(CanFrame::new(can_id, data)))
        }
    }
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    // candump may separate bytes with dots
    let digits: String = hex.chars().filter(|&c| c != '.').collect();
    if !digits.is_ascii() {
        bail!("non-ASCII payload '{}'", hex);
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits in '{}'", hex);
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("bad payload byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

/// Read every frame of a trace file
///
/// Malformed lines are logged and skipped.
pub fn read_trace(path: &Path) -> Result<Vec<CanFrame>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file: {:?}", path))?;

    let mut frames = Vec::new();
    let mut skipped = 0usize;

    for (number, line) in content.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => {}
            Err(e) => {
                skipped += 1;
                log::warn!("{:?}:{}: skipping line: {:#}", path, number + 1, e);
            }
        }
    }

    log::info!(
        "Read {} frames from {:?} ({} malformed lines skipped)",
        frames.len(),
        path,
        skipped
    );
    Ok(frames)
}

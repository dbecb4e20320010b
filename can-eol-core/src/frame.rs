//! Raw CAN frames and DLC handling
//!
//! Frame sources hand the pipeline payloads that are already trimmed to the
//! length designated by the DLC. These helpers do the trimming.

/// CAN FD payload length for each DLC code
const FD_DLC_TO_LEN: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Convert a DLC code to a payload length in bytes
///
/// Classic CAN caps the length at 8 bytes; CAN FD uses the extended table
/// above 8. Only the low nibble of `dlc` is significant.
pub fn dlc_to_len(dlc: u8, is_fd: bool) -> usize {
    let dlc = (dlc & 0x0F) as usize;
    if is_fd {
        FD_DLC_TO_LEN[dlc]
    } else {
        dlc.min(8)
    }
}

/// Smallest DLC whose payload holds exactly `len` bytes, if one exists
pub fn len_to_dlc(len: usize) -> Option<u8> {
    FD_DLC_TO_LEN
        .iter()
        .position(|&l| l == len)
        .map(|dlc| dlc as u8)
}

/// A raw CAN frame as delivered by a frame source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN message ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Payload bytes, already trimmed to the DLC length
    pub data: Vec<u8>,
    /// True if this is a CAN-FD frame
    pub is_fd: bool,
    /// CAN-FD bit rate switch for the data phase
    pub brs: bool,
}

impl CanFrame {
    /// Create a classic CAN frame from an already-sized payload
    pub fn new(can_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            can_id,
            data: data.into(),
            is_fd: false,
            brs: false,
        }
    }

    /// Create a CAN-FD frame sent with bit rate switching
    pub fn fd_brs(can_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            can_id,
            data: data.into(),
            is_fd: true,
            brs: true,
        }
    }

    /// True for a 29-bit identifier
    pub fn is_extended(&self) -> bool {
        self.can_id > 0x7FF
    }

    /// Create a frame from a hardware receive buffer and its DLC
    ///
    /// The buffer is usually the full 8 or 64 byte driver buffer; it is cut
    /// down to the length the DLC designates. A buffer shorter than that is
    /// kept as-is.
    pub fn from_dlc(can_id: u32, dlc: u8, raw: &[u8], is_fd: bool) -> Self {
        let len = dlc_to_len(dlc, is_fd).min(raw.len());
        Self {
            can_id,
            data: raw[..len].to_vec(),
            is_fd,
            brs: false,
        }
    }

    /// Number of payload bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

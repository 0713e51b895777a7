//! CAN frame and identifier types

/// A classic or extended CAN identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    /// A standard 11-bit identifier
    Std(u16),
    /// An extended 29-bit identifier
    Extended(u32),
}

impl CanId {
    /// Create a standard ID, truncating to 11 bits
    pub const fn std(id: u16) -> Self {
        CanId::Std(id & 0x7FF)
    }

    /// Create an extended ID, truncating to 29 bits
    pub const fn extended(id: u32) -> Self {
        CanId::Extended(id & 0x1FFF_FFFF)
    }

    /// Create an ID from a raw value and an extended flag
    pub const fn from_raw(id: u32, extended: bool) -> Self {
        if extended {
            Self::extended(id)
        } else {
            Self::std(id as u16)
        }
    }

    /// Get the raw identifier value
    pub const fn raw(&self) -> u32 {
        match self {
            CanId::Std(id) => *id as u32,
            CanId::Extended(id) => *id,
        }
    }

    /// Returns true for an extended (29-bit) identifier
    pub const fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

/// A classic CAN frame with up to 8 data bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    /// Frame identifier
    pub id: CanId,
    /// The bus the frame was received on, or is to be sent on
    pub bus: u8,
    /// Number of valid data bytes (0..=8)
    pub dlc: u8,
    /// Payload storage; only the first `dlc` bytes are meaningful
    pub data: [u8; 8],
    /// Receive timestamp in microseconds, 0 for locally built frames
    pub timestamp_us: u32,
}

impl CanFrame {
    /// Create a new frame from an ID and payload slice
    ///
    /// Payloads longer than 8 bytes are truncated.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len().min(8);
        let mut buf = [0u8; 8];
        buf[..dlc].copy_from_slice(&data[..dlc]);
        Self {
            id,
            bus: 0,
            dlc: dlc as u8,
            data: buf,
            timestamp_us: 0,
        }
    }

    /// The valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

/// A CAN-FD frame with up to 64 data bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFdFrame {
    /// Frame identifier
    pub id: CanId,
    /// The bus the frame was received on, or is to be sent on
    pub bus: u8,
    /// Number of valid data bytes (0..=64)
    pub len: u8,
    /// Bit rate switching active for the data phase
    pub brs: bool,
    /// Extended data length flag
    pub edl: bool,
    /// Payload storage; only the first `len` bytes are meaningful
    pub data: [u8; 64],
    /// Receive timestamp in microseconds, 0 for locally built frames
    pub timestamp_us: u32,
}

impl CanFdFrame {
    /// Create a new FD frame from an ID and payload slice
    ///
    /// Payloads longer than 64 bytes are truncated.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let len = data.len().min(64);
        let mut buf = [0u8; 64];
        buf[..len].copy_from_slice(&data[..len]);
        Self {
            id,
            bus: 0,
            len: len as u8,
            brs: true,
            edl: true,
            data: buf,
            timestamp_us: 0,
        }
    }

    /// The valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Attempt to reduce this frame to a classic frame
    ///
    /// An FD frame with no rate switching, no extended data length, and at most 8 data bytes is
    /// semantically a classic frame, and must be routed through the classic path so that FD-unaware
    /// observers still see it.
    pub fn as_classic(&self) -> Option<CanFrame> {
        if !self.brs && !self.edl && self.len <= 8 {
            let mut data = [0u8; 8];
            data[..self.len as usize].copy_from_slice(self.data());
            Some(CanFrame {
                id: self.id,
                bus: self.bus,
                dlc: self.len,
                data,
                timestamp_us: self.timestamp_us,
            })
        } else {
            None
        }
    }
}

impl From<CanFrame> for CanFdFrame {
    /// Wrap a classic frame into an FD envelope which is receivable as a plain frame by peers
    fn from(frame: CanFrame) -> Self {
        let mut data = [0u8; 64];
        data[..frame.dlc as usize].copy_from_slice(frame.data());
        Self {
            id: frame.id,
            bus: frame.bus,
            len: frame.dlc,
            brs: false,
            edl: false,
            data,
            timestamp_us: frame.timestamp_us,
        }
    }
}

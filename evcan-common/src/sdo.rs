//! SDO frame encoding and decoding
//!
//! Only expedited transfers are supported: payloads are limited to the 4 data bytes which fit in a
//! single CAN frame. Segmented and block transfers are not implemented.

use snafu::Snafu;

use crate::constants::cob_ids;
use crate::messages::{CanFrame, CanId};

/// SDO command specifiers, as found in the top nibble of the first frame byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SdoCommand {
    /// Request to write an object (initiate download)
    Write = 0x20,
    /// Request to read an object (initiate upload)
    Read = 0x40,
    /// Acknowledgement of a completed write
    WriteAck = 0x60,
}

/// Error decoding an SDO frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum SdoDecodeError {
    /// The command nibble in byte 0 is not a supported expedited command
    #[snafu(display("Unsupported SDO command byte {byte:#04x}"))]
    InvalidCommand {
        /// The offending byte 0 value
        byte: u8,
    },
}

impl TryFrom<u8> for SdoCommand {
    type Error = SdoDecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use SdoCommand::*;
        match value & 0xF0 {
            x if x == Write as u8 => Ok(Write),
            x if x == Read as u8 => Ok(Read),
            x if x == WriteAck as u8 => Ok(WriteAck),
            _ => Err(SdoDecodeError::InvalidCommand { byte: value }),
        }
    }
}

/// A decoded expedited SDO request or response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SdoFrame {
    /// The server node the frame addresses (0..128)
    pub node_id: u8,
    /// Command specifier
    pub cmd: SdoCommand,
    /// Object index
    pub index: u16,
    /// Object sub-index
    pub subindex: u8,
    /// Expedited data bytes; only the first `len` are meaningful
    pub data: [u8; 4],
    /// Number of valid data bytes (0..=4)
    pub len: u8,
}

impl SdoFrame {
    /// Create a frame with no data bytes, e.g. a read request
    pub fn new(node_id: u8, cmd: SdoCommand, index: u16, subindex: u8) -> Self {
        Self {
            node_id: node_id & 0x7F,
            cmd,
            index,
            subindex,
            data: [0; 4],
            len: 0,
        }
    }

    /// Create a frame carrying expedited data, e.g. a write request
    ///
    /// Payloads longer than 4 bytes are truncated.
    pub fn with_data(node_id: u8, cmd: SdoCommand, index: u16, subindex: u8, data: &[u8]) -> Self {
        let len = data.len().min(4);
        let mut buf = [0u8; 4];
        buf[..len].copy_from_slice(&data[..len]);
        Self {
            node_id: node_id & 0x7F,
            cmd,
            index,
            subindex,
            data: buf,
            len: len as u8,
        }
    }

    /// The valid data bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Encode as a request frame at `0x600 + node_id`
    pub fn to_request_frame(&self) -> CanFrame {
        self.encode(cob_ids::SDO_REQUEST_BASE)
    }

    /// Encode as a response frame at `0x580 + node_id`
    pub fn to_response_frame(&self) -> CanFrame {
        self.encode(cob_ids::SDO_RESPONSE_BASE)
    }

    fn encode(&self, base: u32) -> CanFrame {
        let mut buf = [0u8; 8];
        buf[0] = self.cmd as u8;
        if self.len > 0 {
            // Expedited size marker. Kind of dumb the way this works.
            buf[0] |= 0x0F - (self.len - 1) * 4;
        }
        buf[1] = self.index as u8;
        buf[2] = (self.index >> 8) as u8;
        buf[3] = self.subindex;
        buf[4..4 + self.len as usize].copy_from_slice(self.data());

        let mut frame = CanFrame::new(
            CanId::std((base + (self.node_id & 0x7F) as u32) as u16),
            &buf,
        );
        frame.dlc = 8;
        frame
    }

    /// Decode the payload of a frame addressed to `node_id`
    pub fn decode(node_id: u8, buf: &[u8; 8]) -> Result<Self, SdoDecodeError> {
        let cmd = SdoCommand::try_from(buf[0])?;
        let index = buf[1] as u16 | ((buf[2] as u16) << 8);
        let subindex = buf[3];
        // The bare read and write-ack codes carry no expedited data
        let len = if buf[0] != SdoCommand::Read as u8 && buf[0] != SdoCommand::WriteAck as u8 {
            3 - ((buf[0] & 0x0C) >> 2) + 1
        } else {
            0
        };
        let mut data = [0u8; 4];
        data[..len as usize].copy_from_slice(&buf[4..4 + len as usize]);
        Ok(Self {
            node_id,
            cmd,
            index,
            subindex,
            data,
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_encoding() {
        let frame = SdoFrame::new(0x26, SdoCommand::Read, 0x2000, 3).to_request_frame();
        assert_eq!(CanId::std(0x626), frame.id);
        assert_eq!(8, frame.dlc);
        assert_eq!([0x40, 0x00, 0x20, 0x03, 0, 0, 0, 0], frame.data);
    }

    #[test]
    fn test_write_request_encoding() {
        let frame =
            SdoFrame::with_data(5, SdoCommand::Write, 0x1017, 0, &[0xE8, 0x03]).to_request_frame();
        assert_eq!(CanId::std(0x605), frame.id);
        // 2 data bytes: command byte is 0x20 | 0x0B
        assert_eq!([0x2B, 0x17, 0x10, 0x00, 0xE8, 0x03, 0, 0], frame.data);
    }

    #[test]
    fn test_response_id() {
        let frame = SdoFrame::new(0x26, SdoCommand::WriteAck, 0x2000, 3).to_response_frame();
        assert_eq!(CanId::std(0x5A6), frame.id);
        assert_eq!(0x60, frame.data[0]);
    }

    #[test]
    fn test_encode_decode_identity() {
        // Every supported expedited payload length must survive the trip
        for len in 0..=4usize {
            let payload = [0x11, 0x22, 0x33, 0x44];
            let sent = if len == 0 {
                SdoFrame::new(0x10, SdoCommand::Read, 0x3000, 1)
            } else {
                SdoFrame::with_data(0x10, SdoCommand::Write, 0x3000, 1, &payload[..len])
            };
            let wire = sent.to_request_frame();
            let decoded = SdoFrame::decode(0x10, &wire.data).unwrap();
            assert_eq!(sent, decoded, "len={len}");
        }
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let buf = [0x80, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            Err(SdoDecodeError::InvalidCommand { byte: 0x80 }),
            SdoFrame::decode(1, &buf)
        );
    }

    #[test]
    fn test_node_id_masked() {
        let frame = SdoFrame::new(0xFF, SdoCommand::Read, 0, 0);
        assert_eq!(0x7F, frame.node_id);
    }
}

//! Send-only ISO-TP segmentation
//!
//! Splits a payload into single/first/consecutive frames for transmission. Flow-control frames
//! are neither sent nor awaited, there is no retry, and no receive-side reassembly exists in
//! this subsystem. The frame-type code is carried in the low nibble of byte 0, matching the
//! fielded wire format this core must interoperate with.

use evcan_common::{CanFrame, CanId};

use crate::bus::CanBus;

/// Frame type code for a payload fitting one frame
pub const SINGLE: u8 = 0;
/// Frame type code for the first frame of a multi-frame payload
pub const FIRST: u8 = 1;
/// Frame type code for a consecutive frame
pub const CONSEC: u8 = 2;

impl CanBus<'_> {
    /// Send `data` at `id`, segmented into as many frames as needed
    ///
    /// All frames are enqueued before this returns, in order, on this bus.
    pub fn send_isotp(&self, id: u32, data: &[u8]) {
        let length = data.len();
        let id = CanId::std(id as u16);

        if length < 8 {
            // Single frame: type plus length in byte 0
            let mut frame = CanFrame::new(id, &[0; 8]);
            frame.dlc = length as u8 + 1;
            frame.data[0] = SINGLE | ((length as u8) << 4);
            frame.data[1..1 + length].copy_from_slice(data);
            self.send(frame);
            return;
        }

        // First frame: 12-bit length header and 6 data bytes
        let mut frame = CanFrame::new(id, &[0; 8]);
        frame.dlc = 8;
        frame.data[0] = FIRST + (length >> 8) as u8;
        frame.data[1] = length as u8;
        frame.data[2..8].copy_from_slice(&data[..6]);
        self.send(frame);

        // Consecutive frames carry 7 bytes each, with a sequence number cycling 0..=15
        let mut seq: u8 = 0;
        for chunk in data[6..].chunks(7) {
            let mut frame = CanFrame::new(id, &[0; 8]);
            frame.dlc = chunk.len() as u8 + 1;
            frame.data[0] = CONSEC | (seq << 4);
            frame.data[1..1 + chunk.len()].copy_from_slice(chunk);
            seq = (seq + 1) & 0xF;
            self.send(frame);
        }
    }
}

//! CANopen senders layered on the bus send path
//!
//! SDO and NMT wire formats live in [`evcan_common::sdo`] and [`evcan_common::nmt`]; this module
//! adds the bus-level operations device drivers call. Received CANopen traffic is routed by the
//! dispatcher in [`bus`](crate::bus); PDO payloads are delivered verbatim, with no further
//! decoding at this layer.

use defmt_or_log::warn;
use snafu::Snafu;

use evcan_common::constants::cob_ids;
use evcan_common::nmt::NMT_STATE_OPERATIONAL;
use evcan_common::{CanFrame, CanId, NmtCommand, SdoFrame};

use crate::bus::CanBus;

/// Error returned when a PDO cannot be sent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum PdoError {
    /// The ID is outside the PDO range
    #[snafu(display("id {id:#x} is not a valid PDO id"))]
    IdOutOfRange {
        /// The offending ID
        id: u32,
    },
    /// The payload does not fit a classic frame
    #[snafu(display("payload of {len} bytes does not fit a PDO frame"))]
    TooLong {
        /// The offending payload length
        len: usize,
    },
}

impl CanBus<'_> {
    /// Command a node (or all nodes, with `node` 0) to enter the operational state
    pub fn send_node_start(&self, node: u8) {
        self.send(NmtCommand::Start.to_frame(node));
    }

    /// Command a node to enter the pre-operational state
    pub fn send_node_preop(&self, node: u8) {
        self.send(NmtCommand::EnterPreOperational.to_frame(node));
    }

    /// Command a node to reset
    pub fn send_node_reset(&self, node: u8) {
        self.send(NmtCommand::Reset.to_frame(node));
    }

    /// Command a node to stop
    pub fn send_node_stop(&self, node: u8) {
        self.send(NmtCommand::Stop.to_frame(node));
    }

    /// Send a PDO frame with a device-specific payload
    pub fn send_pdo(&self, id: u32, data: &[u8]) -> Result<(), PdoError> {
        if !(cob_ids::PDO_MIN..=cob_ids::PDO_MAX).contains(&id) {
            return Err(PdoError::IdOutOfRange { id });
        }
        if data.len() > 8 {
            return Err(PdoError::TooLong { len: data.len() });
        }
        self.send(CanFrame::new(CanId::std(id as u16), data));
        Ok(())
    }

    /// Send an expedited SDO request at `0x600 + node_id`
    ///
    /// Frames claiming more than 4 data bytes are dropped; segmented transfers are not
    /// supported.
    pub fn send_sdo_request(&self, frame: &SdoFrame) {
        if frame.len > 4 {
            warn!("dropping SDO request with len {}", frame.len);
            return;
        }
        self.send(frame.to_request_frame());
    }

    /// Send an expedited SDO response at `0x580 + node_id`
    pub fn send_sdo_response(&self, frame: &SdoFrame) {
        if frame.len > 4 {
            warn!("dropping SDO response with len {}", frame.len);
            return;
        }
        self.send(frame.to_response_frame());
    }

    /// Send a heartbeat frame at `0x700 + master_id`, always reporting operational
    pub fn send_heartbeat(&self) {
        let id = cob_ids::HEARTBEAT_BASE + self.master_id() as u32;
        self.send(CanFrame::new(
            CanId::std(id as u16),
            &[NMT_STATE_OPERATIONAL],
        ));
    }
}

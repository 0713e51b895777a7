//! Definitions for the NMT protocol

use crate::constants::cob_ids;
use crate::messages::{CanFrame, CanId};

/// NMT command specifiers sent by the bus master
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NmtCommand {
    /// Command a node to enter the operational state
    Start = 0x01,
    /// Command a node to stop
    Stop = 0x02,
    /// Command a node to enter the pre-operational state
    EnterPreOperational = 0x80,
    /// Command a node to reset
    Reset = 0x81,
}

impl core::fmt::Display for NmtCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NmtCommand::Start => write!(f, "Start"),
            NmtCommand::Stop => write!(f, "Stop"),
            NmtCommand::EnterPreOperational => write!(f, "EnterPreOperational"),
            NmtCommand::Reset => write!(f, "Reset"),
        }
    }
}

impl NmtCommand {
    /// Build the 2-byte broadcast frame for this command
    ///
    /// A `node` of 0 addresses all nodes on the bus.
    pub fn to_frame(self, node: u8) -> CanFrame {
        CanFrame::new(CanId::std(cob_ids::NMT as u16), &[self as u8, node & 0x7F])
    }
}

/// The NMT state value reported in heartbeat frames by an operational node
pub const NMT_STATE_OPERATIONAL: u8 = 0x05;

//! Reserved CAN identifiers and bus limits

/// COB-IDs and ID ranges reserved by the CANopen sub-protocol
pub mod cob_ids {
    /// NMT commands are broadcast at ID 0
    pub const NMT: u32 = 0x000;
    /// Lowest ID treated as a PDO when routing for a CANopen observer
    pub const PDO_MIN: u32 = 0x180;
    /// Highest ID treated as a PDO when routing for a CANopen observer
    pub const PDO_MAX: u32 = 0x57F;
    /// Base ID for SDO responses; the server responds at this plus its node ID
    pub const SDO_RESPONSE_BASE: u32 = 0x580;
    /// Base ID for SDO requests; a node is addressed at this plus its node ID
    pub const SDO_REQUEST_BASE: u32 = 0x600;
    /// Base ID for heartbeat frames
    pub const HEARTBEAT_BASE: u32 = 0x700;
}

/// Fixed IDs for the digital/analog I/O bridge sub-protocol
///
/// These should really be configurable.
pub mod io_ids {
    /// Digital output trigger frame (0x88 = set, 0xFF = clear, per byte)
    pub const SWITCH: u32 = 0x606;
    /// Digital output mirror report
    pub const OUTPUTS: u32 = 0x607;
    /// Analog input snapshot
    pub const ANALOG_INPUTS: u32 = 0x608;
    /// Digital input snapshot
    pub const DIGITAL_INPUTS: u32 = 0x609;
}

/// Bit rate limits applied when configuring a bus
pub mod bit_rates {
    /// Lowest supported arbitration-phase bit rate
    pub const CLASSIC_MIN: u32 = 33_333;
    /// Highest supported arbitration-phase bit rate
    pub const CLASSIC_MAX: u32 = 1_000_000;
    /// Lowest supported FD data-phase bit rate
    pub const FD_DATA_MIN: u32 = 500_000;
    /// Highest supported FD data-phase bit rate
    pub const FD_DATA_MAX: u32 = 8_000_000;
}

//! GVRET serial bridge for SavvyCAN-class diagnostic tools
//!
//! The bridge tunnels live CAN traffic over a secondary serial channel using the GVRET binary
//! protocol: a byte-level state machine parses frames and queries arriving from the tool, and a
//! copy of every frame the buses send or receive is serialized back out. Malformed or unexpected
//! bytes are absorbed by the state machine's unhandled-to-idle default; no resynchronization
//! signal is sent back to the tool. This is a best-effort diagnostic channel, not a
//! safety-relevant path.

use core::cell::RefCell;

use critical_section::Mutex;
use defmt_or_log::debug;
use embedded_io::{Read, ReadReady, Write};
use heapless::Vec;
use int_enum::IntEnum;
use portable_atomic::{AtomicBool, Ordering};

use evcan_common::traits::{FrameTap, SystemIo};
use evcan_common::{CanFdFrame, CanFrame, CanId};

use crate::bus::CanBus;

/// Byte in the idle state which enables binary output mode
const ENABLE_BINARY_OUTPUT: u8 = 0xE7;
/// Start-of-command marker, also the leading byte of every outbound record
const MARKER: u8 = 0xF1;

/// Build number reported by the device-info query
const BUILD_NUMBER: u16 = 621;

/// Sub-command byte following the `0xF1` marker
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GvretCommand {
    /// Build a classic frame to transmit on a selected bus
    BuildCanFrame = 0,
    /// Report the microsecond clock
    TimeSync = 1,
    /// Report the digital input states
    DigInputs = 2,
    /// Report the analog input values
    AnaInputs = 3,
    /// Report per-bus enablement and bit rates
    GetCanParams = 6,
    /// Report device build information
    GetDeviceInfo = 7,
    /// Connection keepalive
    Keepalive = 9,
    /// Report the number of buses
    GetNumBuses = 12,
    /// Report extended bus information
    GetExtBuses = 13,
    /// Build an FD frame to transmit on the FD-capable bus
    BuildFdFrame = 20,
}

/// Parser states; one input byte is consumed per step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParserState {
    Idle,
    GetCommand,
    BuildCanFrame,
    BuildFdFrame,
}

/// A completed parse, to be acted on by the bridge
#[derive(Debug)]
pub enum GvretEvent {
    /// The tool enabled binary output mode
    BinaryOutputEnabled,
    /// A classic frame to send on the selected bus
    Frame {
        /// The frame to transmit
        frame: CanFrame,
        /// Destination bus index
        bus: u8,
    },
    /// An FD frame to send on the FD-capable bus
    FdFrame(CanFdFrame),
    /// A query with a fixed-layout synchronous reply
    Query(GvretCommand),
}

/// The GVRET byte-stream parser
///
/// Created once per bridge and mutated one byte at a time; the staging frames are reused across
/// parses, so no per-frame allocation occurs.
#[derive(Debug)]
pub struct GvretParser {
    state: ParserState,
    step: usize,
    raw_id: u32,
    target_bus: u8,
    staging: CanFrame,
    staging_fd: CanFdFrame,
}

impl Default for GvretParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GvretParser {
    /// Create a parser in the idle state
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            step: 0,
            raw_id: 0,
            target_bus: 0,
            staging: CanFrame::new(CanId::std(0), &[]),
            staging_fd: CanFdFrame::new(CanId::std(0), &[]),
        }
    }

    /// Consume one input byte, possibly completing an event
    pub fn push(&mut self, byte: u8) -> Option<GvretEvent> {
        match self.state {
            ParserState::Idle => match byte {
                ENABLE_BINARY_OUTPUT => Some(GvretEvent::BinaryOutputEnabled),
                MARKER => {
                    self.state = ParserState::GetCommand;
                    None
                }
                _ => None,
            },
            ParserState::GetCommand => {
                self.state = ParserState::Idle;
                match GvretCommand::try_from(byte) {
                    Ok(GvretCommand::BuildCanFrame) => {
                        self.state = ParserState::BuildCanFrame;
                        self.step = 0;
                        self.raw_id = 0;
                        None
                    }
                    Ok(GvretCommand::BuildFdFrame) => {
                        self.state = ParserState::BuildFdFrame;
                        self.step = 0;
                        self.raw_id = 0;
                        None
                    }
                    Ok(query) => Some(GvretEvent::Query(query)),
                    // Legacy and unknown sub-commands fall back to idle, silently
                    Err(_) => None,
                }
            }
            ParserState::BuildCanFrame => self.push_build_can(byte),
            ParserState::BuildFdFrame => self.push_build_fd(byte),
        }
    }

    /// Accumulate one little-endian ID byte; bit 31 flags extended addressing
    fn push_id_byte(&mut self, byte: u8) -> CanId {
        self.raw_id |= (byte as u32) << (8 * self.step);
        let extended = self.raw_id & (1 << 31) != 0;
        CanId::from_raw(self.raw_id & !(1 << 31), extended)
    }

    fn push_build_can(&mut self, byte: u8) -> Option<GvretEvent> {
        match self.step {
            0..=3 => {
                self.staging.id = self.push_id_byte(byte);
                self.step += 1;
            }
            4 => {
                self.target_bus = byte & 3;
                self.step += 1;
            }
            5 => {
                self.staging.dlc = byte.min(8);
                self.step += 1;
            }
            n => {
                let idx = n - 6;
                if idx < self.staging.dlc as usize {
                    self.staging.data[idx] = byte;
                    self.step += 1;
                } else {
                    // This byte is the frame checksum: received, never validated
                    self.state = ParserState::Idle;
                    return Some(GvretEvent::Frame {
                        frame: self.staging,
                        bus: self.target_bus,
                    });
                }
            }
        }
        None
    }

    fn push_build_fd(&mut self, byte: u8) -> Option<GvretEvent> {
        match self.step {
            0..=3 => {
                self.staging_fd.id = self.push_id_byte(byte);
                self.step += 1;
            }
            4 => {
                // Reserved
                self.step += 1;
            }
            5 => {
                self.staging_fd.len = byte.min(64);
                self.step += 1;
                if self.staging_fd.len == 0 {
                    self.state = ParserState::Idle;
                    return Some(GvretEvent::FdFrame(self.staging_fd));
                }
            }
            n => {
                let idx = n - 6;
                self.staging_fd.data[idx] = byte;
                self.step += 1;
                if idx + 1 == self.staging_fd.len as usize {
                    self.state = ParserState::Idle;
                    return Some(GvretEvent::FdFrame(self.staging_fd));
                }
            }
        }
        None
    }
}

/// XOR checksum over a reply buffer
fn checksum(buf: &[u8]) -> u8 {
    buf.iter().fold(0, |acc, b| acc ^ b)
}

/// The serial bridge: parser, reply generation, and outbound traffic mirroring
///
/// `poll` is driven from the cooperative main loop and consumes exactly the bytes currently
/// available on the serial channel. The bridge also implements [`FrameTap`]; attach it to a bus
/// with [`CanBus::set_tap`] to mirror that bus's traffic out to the tool. Mirroring is active
/// only while both bridge mode and binary output mode are enabled.
pub struct GvretBridge<S> {
    serial: Mutex<RefCell<S>>,
    parser: Mutex<RefCell<GvretParser>>,
    bridge_mode: AtomicBool,
    binary_output: AtomicBool,
}

impl<S> GvretBridge<S>
where
    S: Read + Write + ReadReady,
{
    /// Create a bridge around a serial channel
    pub fn new(serial: S) -> Self {
        Self {
            serial: Mutex::new(RefCell::new(serial)),
            parser: Mutex::new(RefCell::new(GvretParser::new())),
            bridge_mode: AtomicBool::new(false),
            binary_output: AtomicBool::new(false),
        }
    }

    /// Globally enable or disable the bridge
    pub fn set_bridge_mode(&self, enabled: bool) {
        self.bridge_mode.store(enabled, Ordering::Relaxed);
    }

    /// Whether the bridge is enabled
    pub fn bridge_mode(&self) -> bool {
        self.bridge_mode.load(Ordering::Relaxed)
    }

    /// Consume all currently-available serial bytes and act on completed events
    ///
    /// Never blocks waiting for more input; partial commands stay staged in the parser until the
    /// next call.
    pub fn poll(&self, buses: &[&CanBus<'_>], io: &dyn SystemIo, now_us: u32) {
        if !self.bridge_mode() {
            return;
        }

        loop {
            let mut byte = [0u8; 1];
            let read = critical_section::with(|cs| {
                let mut serial = self.serial.borrow_ref_mut(cs);
                if !serial.read_ready().unwrap_or(false) {
                    return 0;
                }
                serial.read(&mut byte).unwrap_or(0)
            });
            if read == 0 {
                break;
            }

            let event = critical_section::with(|cs| self.parser.borrow_ref_mut(cs).push(byte[0]));
            if let Some(event) = event {
                self.handle_event(event, buses, io, now_us);
            }
        }
    }

    fn handle_event(
        &self,
        event: GvretEvent,
        buses: &[&CanBus<'_>],
        io: &dyn SystemIo,
        now_us: u32,
    ) {
        match event {
            GvretEvent::BinaryOutputEnabled => {
                self.binary_output.store(true, Ordering::Relaxed);
            }
            GvretEvent::Frame { frame, bus } => {
                if let Some(bus) = buses.get(bus as usize) {
                    bus.send(frame);
                }
            }
            GvretEvent::FdFrame(frame) => {
                if let Some(bus) = buses.iter().find(|b| b.id().fd_capable()) {
                    bus.send_fd(frame);
                }
            }
            GvretEvent::Query(query) => self.send_reply(query, buses, io, now_us),
        }
    }

    fn send_reply(&self, query: GvretCommand, buses: &[&CanBus<'_>], io: &dyn SystemIo, now_us: u32) {
        let mut reply: Vec<u8, 24> = Vec::new();
        reply.extend_from_slice(&[MARKER, query as u8]).ok();

        match query {
            GvretCommand::TimeSync => {
                reply.extend_from_slice(&now_us.to_le_bytes()).ok();
            }
            GvretCommand::DigInputs => {
                let mut bits = 0u8;
                for channel in 0..4 {
                    if io.digital_in(channel) {
                        bits |= 1 << channel;
                    }
                }
                reply.push(bits).ok();
                reply.push(checksum(&reply)).ok();
            }
            GvretCommand::AnaInputs => {
                for channel in 0..8 {
                    reply
                        .extend_from_slice(&io.analog_in(channel).to_le_bytes())
                        .ok();
                }
                reply.push(checksum(&reply)).ok();
            }
            GvretCommand::GetCanParams => {
                for bus in buses.iter().take(2) {
                    reply.push(bus.enabled() as u8).ok();
                    reply.extend_from_slice(&bus.bus_speed().to_le_bytes()).ok();
                }
            }
            GvretCommand::GetDeviceInfo => {
                reply.extend_from_slice(&BUILD_NUMBER.to_le_bytes()).ok();
                reply.extend_from_slice(&[0x20, 0, 0, 0]).ok();
            }
            GvretCommand::Keepalive => {
                reply.extend_from_slice(&[0xDE, 0xAD]).ok();
            }
            GvretCommand::GetNumBuses => {
                reply.push(buses.len() as u8).ok();
            }
            GvretCommand::GetExtBuses => {
                // No extended buses on this hardware
                reply.extend_from_slice(&[0; 15]).ok();
            }
            // Build commands never arrive here
            GvretCommand::BuildCanFrame | GvretCommand::BuildFdFrame => return,
        }

        debug!("gvret: reply to command {}", query as u8);
        self.write_out(&reply);
    }

    fn write_out(&self, buf: &[u8]) {
        critical_section::with(|cs| {
            self.serial.borrow_ref_mut(cs).write_all(buf).ok();
        });
    }

    fn mirroring(&self) -> bool {
        self.bridge_mode() && self.binary_output.load(Ordering::Relaxed)
    }
}

impl<S> FrameTap for GvretBridge<S>
where
    S: Read + Write + ReadReady + Send,
{
    fn classic_frame(&self, frame: &CanFrame) {
        if !self.mirroring() {
            return;
        }
        let mut buf = [0u8; 20];
        buf[0] = MARKER;
        buf[1] = GvretCommand::BuildCanFrame as u8;
        buf[2..6].copy_from_slice(&frame.timestamp_us.to_le_bytes());
        let mut id = frame.id.raw();
        if frame.id.is_extended() {
            id |= 1 << 31;
        }
        buf[6..10].copy_from_slice(&id.to_le_bytes());
        let dlc = frame.dlc.min(8) as usize;
        buf[10] = (frame.bus << 4) | dlc as u8;
        buf[11..11 + dlc].copy_from_slice(&frame.data[..dlc]);
        buf[11 + dlc] = 0;
        self.write_out(&buf[..12 + dlc]);
    }

    fn fd_frame(&self, frame: &CanFdFrame) {
        if !self.mirroring() {
            return;
        }
        let mut buf = [0u8; 77];
        buf[0] = MARKER;
        buf[1] = GvretCommand::BuildFdFrame as u8;
        buf[2..6].copy_from_slice(&frame.timestamp_us.to_le_bytes());
        let mut id = frame.id.raw();
        if frame.id.is_extended() {
            id |= 1 << 31;
        }
        buf[6..10].copy_from_slice(&id.to_le_bytes());
        buf[10] = 0; // reserved tag, mirrors the build command layout
        let len = frame.len.min(64) as usize;
        buf[11] = len as u8;
        buf[12..12 + len].copy_from_slice(&frame.data[..len]);
        buf[12 + len] = 0;
        self.write_out(&buf[..13 + len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut GvretParser, bytes: &[u8]) -> Option<GvretEvent> {
        let mut event = None;
        for b in bytes {
            event = parser.push(*b);
        }
        event
    }

    #[test]
    fn test_binary_output_enable_keeps_state() {
        let mut parser = GvretParser::new();
        assert!(matches!(
            parser.push(0xE7),
            Some(GvretEvent::BinaryOutputEnabled)
        ));
        assert_eq!(ParserState::Idle, parser.state);
    }

    #[test]
    fn test_noise_is_ignored_in_idle() {
        let mut parser = GvretParser::new();
        assert!(feed(&mut parser, &[0x00, 0x55, 0xAA, 0xFE]).is_none());
        assert_eq!(ParserState::Idle, parser.state);
    }

    #[test]
    fn test_unknown_command_returns_to_idle() {
        let mut parser = GvretParser::new();
        // 5 = legacy bus-setup command, not handled
        assert!(feed(&mut parser, &[0xF1, 5]).is_none());
        assert_eq!(ParserState::Idle, parser.state);
    }

    #[test]
    fn test_query_command() {
        let mut parser = GvretParser::new();
        let event = feed(&mut parser, &[0xF1, 9]);
        assert!(matches!(
            event,
            Some(GvretEvent::Query(GvretCommand::Keepalive))
        ));
        assert_eq!(ParserState::Idle, parser.state);
    }

    #[test]
    fn test_build_can_frame() {
        let mut parser = GvretParser::new();
        let mut bytes = vec![0xF1, 0x00];
        bytes.extend_from_slice(&0x123u32.to_le_bytes());
        bytes.push(1); // bus
        bytes.push(3); // dlc
        bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        bytes.push(0x5A); // checksum, not validated

        let event = feed(&mut parser, &bytes);
        match event {
            Some(GvretEvent::Frame { frame, bus }) => {
                assert_eq!(CanId::std(0x123), frame.id);
                assert_eq!(1, bus);
                assert_eq!(&[0xAA, 0xBB, 0xCC], frame.data());
            }
            other => panic!("expected frame event, got {other:?}"),
        }
        assert_eq!(ParserState::Idle, parser.state);
    }

    #[test]
    fn test_build_can_frame_extended_id() {
        let mut parser = GvretParser::new();
        let mut bytes = vec![0xF1, 0x00];
        bytes.extend_from_slice(&(0x1ABCDu32 | (1 << 31)).to_le_bytes());
        bytes.extend_from_slice(&[0, 1, 0x42, 0]);

        match feed(&mut parser, &bytes) {
            Some(GvretEvent::Frame { frame, .. }) => {
                assert_eq!(CanId::extended(0x1ABCD), frame.id);
                assert!(frame.id.is_extended());
            }
            other => panic!("expected frame event, got {other:?}"),
        }
    }

    #[test]
    fn test_build_can_frame_length_clamped() {
        let mut parser = GvretParser::new();
        let mut bytes = vec![0xF1, 0x00];
        bytes.extend_from_slice(&0x55u32.to_le_bytes());
        bytes.push(0);
        bytes.push(200); // absurd dlc clamps to 8
        bytes.extend_from_slice(&[0; 8]);
        bytes.push(0);

        match feed(&mut parser, &bytes) {
            Some(GvretEvent::Frame { frame, .. }) => assert_eq!(8, frame.dlc),
            other => panic!("expected frame event, got {other:?}"),
        }
    }

    #[test]
    fn test_build_fd_frame() {
        let mut parser = GvretParser::new();
        let mut bytes = vec![0xF1, 20];
        bytes.extend_from_slice(&0x300u32.to_le_bytes());
        bytes.push(0); // reserved
        bytes.push(12);
        bytes.extend_from_slice(&[7; 12]);

        match feed(&mut parser, &bytes) {
            Some(GvretEvent::FdFrame(frame)) => {
                assert_eq!(CanId::std(0x300), frame.id);
                assert_eq!(&[7; 12], frame.data());
            }
            other => panic!("expected fd frame event, got {other:?}"),
        }
        assert_eq!(ParserState::Idle, parser.state);
    }

    #[test]
    fn test_staging_reused_across_frames() {
        let mut parser = GvretParser::new();
        for i in 0..3u8 {
            let mut bytes = vec![0xF1, 0x00];
            bytes.extend_from_slice(&(0x100u32 + i as u32).to_le_bytes());
            bytes.extend_from_slice(&[0, 1, i, 0]);
            match feed(&mut parser, &bytes) {
                Some(GvretEvent::Frame { frame, .. }) => {
                    assert_eq!(0x100 + i as u32, frame.id.raw());
                    assert_eq!(&[i], frame.data());
                }
                other => panic!("expected frame event, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_checksum_is_xor() {
        assert_eq!(0, checksum(&[]));
        assert_eq!(0xF1 ^ 0x02 ^ 0x05, checksum(&[0xF1, 0x02, 0x05]));
    }
}

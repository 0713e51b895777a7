//! Test doubles for the hardware interfaces the bus core consumes

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use evcan_bus::CanObserver;
use evcan_common::traits::{CanTransmitter, SystemIo};
use evcan_common::{CanFdFrame, CanFrame, SdoFrame};

/// A transmitter which records every frame handed to the hardware queue
#[derive(Default)]
pub struct RecordingTransmitter {
    classic: Mutex<Vec<CanFrame>>,
    fd: Mutex<Vec<CanFdFrame>>,
}

impl RecordingTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<CanFrame> {
        self.classic.lock().unwrap().clone()
    }

    pub fn sent_fd(&self) -> Vec<CanFdFrame> {
        self.fd.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.classic.lock().unwrap().clear();
        self.fd.lock().unwrap().clear();
    }
}

impl CanTransmitter for RecordingTransmitter {
    fn transmit(&self, frame: &CanFrame) {
        self.classic.lock().unwrap().push(*frame);
    }

    fn transmit_fd(&self, frame: &CanFdFrame) {
        self.fd.lock().unwrap().push(*frame);
    }
}

/// Simulated digital/analog I/O with settable input states
#[derive(Default)]
pub struct SimIo {
    digital_in: Mutex<[bool; 8]>,
    digital_out: Mutex<[bool; 8]>,
    analog_in: Mutex<[i16; 8]>,
}

impl SimIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_digital_in(&self, channel: usize, on: bool) {
        self.digital_in.lock().unwrap()[channel] = on;
    }

    pub fn set_analog_in(&self, channel: usize, value: i16) {
        self.analog_in.lock().unwrap()[channel] = value;
    }
}

impl SystemIo for SimIo {
    fn digital_in(&self, channel: usize) -> bool {
        self.digital_in.lock().unwrap()[channel]
    }

    fn digital_out(&self, channel: usize) -> bool {
        self.digital_out.lock().unwrap()[channel]
    }

    fn set_digital_out(&self, channel: usize, on: bool) {
        self.digital_out.lock().unwrap()[channel] = on;
    }

    fn analog_in(&self, channel: usize) -> i16 {
        self.analog_in.lock().unwrap()[channel]
    }
}

/// An observer which records everything delivered to it
#[derive(Default)]
pub struct RecordingObserver {
    canopen: bool,
    node_id: u8,
    pub frames: Mutex<Vec<CanFrame>>,
    pub fd_frames: Mutex<Vec<CanFdFrame>>,
    pub pdos: Mutex<Vec<CanFrame>>,
    pub sdo_requests: Mutex<Vec<SdoFrame>>,
    pub sdo_responses: Mutex<Vec<SdoFrame>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_canopen(node_id: u8) -> Self {
        Self {
            canopen: true,
            node_id,
            ..Default::default()
        }
    }

    pub fn frames(&self) -> Vec<CanFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn fd_frames(&self) -> Vec<CanFdFrame> {
        self.fd_frames.lock().unwrap().clone()
    }

    pub fn pdos(&self) -> Vec<CanFrame> {
        self.pdos.lock().unwrap().clone()
    }

    pub fn sdo_requests(&self) -> Vec<SdoFrame> {
        self.sdo_requests.lock().unwrap().clone()
    }

    pub fn sdo_responses(&self) -> Vec<SdoFrame> {
        self.sdo_responses.lock().unwrap().clone()
    }
}

impl CanObserver for RecordingObserver {
    fn canopen(&self) -> bool {
        self.canopen
    }

    fn node_id(&self) -> u8 {
        self.node_id
    }

    fn handle_frame(&self, frame: &CanFrame) {
        self.frames.lock().unwrap().push(*frame);
    }

    fn handle_fd_frame(&self, frame: &CanFdFrame) {
        self.fd_frames.lock().unwrap().push(*frame);
    }

    fn handle_pdo(&self, frame: &CanFrame) {
        self.pdos.lock().unwrap().push(*frame);
    }

    fn handle_sdo_request(&self, frame: &SdoFrame) {
        self.sdo_requests.lock().unwrap().push(*frame);
    }

    fn handle_sdo_response(&self, frame: &SdoFrame) {
        self.sdo_responses.lock().unwrap().push(*frame);
    }
}

/// A bidirectional in-memory serial channel
///
/// Clones share the same buffers, so a test can keep one end while the bridge owns the other.
#[derive(Clone, Default)]
pub struct SerialPipe {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<Vec<u8>>>,
}

impl SerialPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the bridge to read on its next poll
    pub fn inject(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Drain everything the bridge has written
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.tx.lock().unwrap())
    }
}

impl embedded_io::ErrorType for SerialPipe {
    type Error = Infallible;
}

impl embedded_io::Read for SerialPipe {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let mut rx = self.rx.lock().unwrap();
        let mut count = 0;
        for slot in buf.iter_mut() {
            match rx.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for SerialPipe {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        Ok(!self.rx.lock().unwrap().is_empty())
    }
}

impl embedded_io::Write for SerialPipe {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.tx.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

//! Common traits

use crate::messages::{CanFdFrame, CanFrame};

/// A handle to a hardware transmit queue for one CAN controller
///
/// Implementations are expected to be internally synchronized, as frames may be queued from both
/// the polling loop and interrupt-priority dispatch. Enqueue failures stay at the hardware-queue
/// level and are not surfaced to callers; sends are fire-and-forget.
pub trait CanTransmitter: Sync {
    /// Queue a classic frame for transmission
    fn transmit(&self, frame: &CanFrame);

    /// Queue an FD frame for transmission
    fn transmit_fd(&self, frame: &CanFdFrame);
}

/// Access to the digital and analog I/O hardware
///
/// Consumed only by the reserved-ID I/O bridge and the GVRET input queries.
pub trait SystemIo: Sync {
    /// Read a digital input channel
    fn digital_in(&self, channel: usize) -> bool;

    /// Read back the state of a digital output channel
    fn digital_out(&self, channel: usize) -> bool;

    /// Set a digital output channel
    fn set_digital_out(&self, channel: usize, on: bool);

    /// Read an analog input channel
    fn analog_in(&self, channel: usize) -> i16;
}

/// A tap receiving a copy of every frame a bus sends or receives
///
/// The GVRET bridge implements this to mirror live traffic out to the diagnostic serial channel.
/// Calls may come from interrupt-priority dispatch and must be short and non-blocking.
pub trait FrameTap: Sync {
    /// A classic frame was sent or received
    fn classic_frame(&self, frame: &CanFrame);

    /// An FD frame was sent or received
    fn fd_frame(&self, frame: &CanFdFrame);
}

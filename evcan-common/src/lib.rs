//! Common functionality shared among the evcan crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `evcan-bus`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]

pub mod constants;
pub mod messages;
pub mod nmt;
pub mod sdo;
pub mod traits;

pub use messages::{CanFdFrame, CanFrame, CanId};
pub use nmt::NmtCommand;
pub use sdo::{SdoCommand, SdoFrame};

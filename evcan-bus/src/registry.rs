//! Fixed-capacity subscription table for one bus

use snafu::Snafu;

use crate::observer::CanObserver;

/// Maximum number of device subscriptions per CAN bus
pub const REGISTRY_CAPACITY: usize = 12;

/// How frames are routed to a subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscriptionMode {
    /// Deliver frames whose ID matches the subscription's id/mask filter
    Raw,
    /// Route by CANopen semantics (PDO range, SDO IDs from the owner's node ID), ignoring the
    /// id/mask filter
    CanOpen,
}

/// One registry entry
#[derive(Clone, Copy)]
pub struct Subscription<'a> {
    /// The ID to listen for
    pub id: u32,
    /// The mask applied to received IDs before comparison
    pub mask: u32,
    /// Whether extended frames are expected
    pub extended: bool,
    /// Routing mode, captured from the owner at attach time
    pub mode: SubscriptionMode,
    /// The subscribing device
    pub owner: &'a dyn CanObserver,
}

impl Subscription<'_> {
    /// Mask-match a received ID against this subscription
    pub fn matches(&self, id: u32) -> bool {
        (id & self.mask) == (self.id & self.mask)
    }
}

impl core::fmt::Debug for Subscription<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("mask", &self.mask)
            .field("extended", &self.extended)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Error returned by [`Registry::attach`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum AttachError {
    /// All subscription slots on this bus are occupied
    #[snafu(display("no free subscription slot; increase REGISTRY_CAPACITY"))]
    RegistryFull,
}

/// The per-bus slot table
///
/// An empty slot is simply `None`; there is no compaction, and attaching an identical
/// (owner, id, mask) triple twice creates two entries. Detach is keyed on that triple, with
/// owner identity being pointer identity.
pub(crate) struct Registry<'a> {
    slots: [Option<Subscription<'a>>; REGISTRY_CAPACITY],
}

impl<'a> Registry<'a> {
    pub const fn new() -> Self {
        Self {
            slots: [None; REGISTRY_CAPACITY],
        }
    }

    pub fn attach(&mut self, sub: Subscription<'a>) -> Result<(), AttachError> {
        for slot in self.slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(sub);
                return Ok(());
            }
        }
        Err(AttachError::RegistryFull)
    }

    pub fn detach(&mut self, owner: &dyn CanObserver, id: u32, mask: u32) {
        for slot in self.slots.iter_mut() {
            if let Some(sub) = slot {
                if core::ptr::eq(sub.owner as *const _ as *const (), owner as *const _ as *const ())
                    && sub.id == id
                    && sub.mask == mask
                {
                    *slot = None;
                }
            }
        }
    }

    pub fn detach_all(&mut self, owner: &dyn CanObserver) {
        for slot in self.slots.iter_mut() {
            if let Some(sub) = slot {
                if core::ptr::eq(sub.owner as *const _ as *const (), owner as *const _ as *const ())
                {
                    *slot = None;
                }
            }
        }
    }

    /// Copy the slot table out, so dispatch can fan out without holding the registry lock
    pub fn snapshot(&self) -> [Option<Subscription<'a>>; REGISTRY_CAPACITY] {
        self.slots
    }
}

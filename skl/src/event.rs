//! Events flowing through the keyboard.
//!
//! Two kinds of events exist:
//! - [`PositionStateChanged`], a physical key at a position is pressed or released
//! - [`KeycodeStateChanged`], a logical keycode is pressed or released, either because a key press
//!   binding was resolved or because a behavior synthesized it
//!
//! Listeners return an [`EventResult`] to decide whether later listeners see the event.

use embassy_time::Instant;
use skl_types::keycode::EncodedKey;
use skl_types::modifier::HidModifiers;

use crate::sticky_key::pool::SlotHandle;

/// Result of an event listener
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventResult {
    /// Continue delivering the event to later listeners
    Bubble,
    /// Stop delivering the event
    Captured,
}

/// A physical key changed its state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PositionStateChanged {
    pub position: u32,
    pub pressed: bool,
    pub timestamp: Instant,
    /// Originating half of a split keyboard, `None` for the central half
    pub source: Option<u8>,
}

impl PositionStateChanged {
    pub fn new(position: u32, pressed: bool, timestamp: Instant) -> Self {
        Self {
            position,
            pressed,
            timestamp,
            source: None,
        }
    }

    pub fn with_source(self, source: u8) -> Self {
        Self {
            source: Some(source),
            ..self
        }
    }
}

/// Where a keycode event comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Provenance {
    /// Resolved from a physical key press
    Keymap,
    /// Synthesized by the sticky key held in the given slot
    StickyKey(SlotHandle),
}

/// A keycode changed its state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeycodeStateChanged {
    pub usage_page: u8,
    pub keycode: u32,
    pub implicit_modifiers: HidModifiers,
    pub pressed: bool,
    pub timestamp: Instant,
    pub provenance: Provenance,
}

impl KeycodeStateChanged {
    /// Decode the event from an encoded key usage, as carried by key press bindings
    pub fn from_encoded(key: EncodedKey, pressed: bool, timestamp: Instant, provenance: Provenance) -> Self {
        Self {
            usage_page: key.usage_page(),
            keycode: key.usage_id() as u32,
            implicit_modifiers: key.implicit_modifiers(),
            pressed,
            timestamp,
            provenance,
        }
    }

    /// The `(usage page, keycode)` pair identifying the key
    pub fn usage(&self) -> (u8, u32) {
        (self.usage_page, self.keycode)
    }

    /// Returns `true` if the event was synthesized by the sticky key in `slot`
    pub fn is_from(&self, slot: SlotHandle) -> bool {
        self.provenance == Provenance::StickyKey(slot)
    }
}

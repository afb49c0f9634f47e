//! Behaviors and the bindings which place them in the keymap.

use embassy_time::Instant;
use serde::{Deserialize, Serialize};
use skl_types::keycode::{EncodedKey, HidKeyCode};

use crate::event::PositionStateChanged;

/// A behavior, the "what happens" part of a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Do nothing
    #[default]
    None,
    /// Fall through to the next active layer below
    Transparent,
    /// Press the encoded key in `param1`
    KeyPress,
    /// Activate layer `param1` while held
    MomentaryLayer,
    /// Switch to layer `param1`, leaving only it and the default layer active
    ToLayer,
    /// Sticky key layer instance `n`, with the modifier in `param1` and the layer in `param2`
    StickyKeyLayer(u8),
}

/// Kind of a behavior parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParameterKind {
    /// No parameter
    Unused,
    /// An encoded HID usage
    HidUsage,
    /// A layer id
    LayerId,
    /// The instance's own configuration
    Instance,
}

/// The parameters a behavior takes, used for validating bindings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParameterMetadata {
    pub param1: ParameterKind,
    pub param2: ParameterKind,
}

impl Behavior {
    pub fn parameter_metadata(&self) -> ParameterMetadata {
        let (param1, param2) = match self {
            Behavior::None | Behavior::Transparent => (ParameterKind::Unused, ParameterKind::Unused),
            Behavior::KeyPress => (ParameterKind::HidUsage, ParameterKind::Unused),
            Behavior::MomentaryLayer | Behavior::ToLayer => (ParameterKind::LayerId, ParameterKind::Unused),
            Behavior::StickyKeyLayer(_) => (ParameterKind::HidUsage, ParameterKind::LayerId),
        };
        ParameterMetadata { param1, param2 }
    }
}

/// A behavior with its parameters, as stored in a keymap
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Binding {
    pub behavior: Behavior,
    #[serde(default)]
    pub param1: u32,
    #[serde(default)]
    pub param2: u32,
}

impl Binding {
    pub const fn new(behavior: Behavior, param1: u32, param2: u32) -> Self {
        Self {
            behavior,
            param1,
            param2,
        }
    }

    pub const fn none() -> Self {
        Self::new(Behavior::None, 0, 0)
    }

    pub const fn transparent() -> Self {
        Self::new(Behavior::Transparent, 0, 0)
    }

    pub const fn key_press(key: EncodedKey) -> Self {
        Self::new(Behavior::KeyPress, key.0, 0)
    }

    pub const fn key(keycode: HidKeyCode) -> Self {
        Self::key_press(EncodedKey::key(keycode))
    }

    pub const fn momentary_layer(layer: u8) -> Self {
        Self::new(Behavior::MomentaryLayer, layer as u32, 0)
    }

    pub const fn to_layer(layer: u8) -> Self {
        Self::new(Behavior::ToLayer, layer as u32, 0)
    }

    pub const fn sticky_key_layer(instance: u8, modifier: EncodedKey, layer: u8) -> Self {
        Self::new(Behavior::StickyKeyLayer(instance), modifier.0, layer as u32)
    }
}

/// The context a binding is invoked in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BindingEvent {
    pub position: u32,
    pub timestamp: Instant,
    pub source: Option<u8>,
}

impl From<&PositionStateChanged> for BindingEvent {
    fn from(e: &PositionStateChanged) -> Self {
        Self {
            position: e.position,
            timestamp: e.timestamp,
            source: e.source,
        }
    }
}

/// Create a key press binding. For example, `kp!(A)` presses `HidKeyCode::A`
#[macro_export]
macro_rules! kp {
    ($k: ident) => {
        $crate::behavior::Binding::key($crate::types::keycode::HidKeyCode::$k)
    };
}

/// Create a momentary layer binding. For example, `mo!(1)` activates layer 1 while held
#[macro_export]
macro_rules! mo {
    ($x: literal) => {
        $crate::behavior::Binding::momentary_layer($x)
    };
}

/// Create a to-layer binding
#[macro_export]
macro_rules! to {
    ($x: literal) => {
        $crate::behavior::Binding::to_layer($x)
    };
}

/// Create a transparent binding
#[macro_export]
macro_rules! trans {
    () => {
        $crate::behavior::Binding::transparent()
    };
}

/// Create an empty binding
#[macro_export]
macro_rules! none {
    () => {
        $crate::behavior::Binding::none()
    };
}

/// Create a sticky key layer binding. For example, `skl!(0, LCtrl, 2)` applies LCtrl through instance 0,
/// whose target layer is 2
#[macro_export]
macro_rules! skl {
    ($instance: literal, $m: ident, $layer: literal) => {
        $crate::behavior::Binding::sticky_key_layer(
            $instance,
            $crate::types::keycode::EncodedKey::key($crate::types::keycode::HidKeyCode::$m),
            $layer,
        )
    };
}

//! Configuration of the sticky key layer behavior.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::behavior::{Behavior, ParameterKind, ParameterMetadata};
use crate::error::StickyKeyError;

/// Configuration of one sticky key layer instance.
///
/// Every sticky key bound to the instance shares it, read-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct StickyKeyLayerConfig {
    /// Time after the sticky key is released before it times out, if no other key consumes it
    pub release_after_ms: u32,
    /// Release the sticky key as soon as the key consuming it is pressed, instead of when it's released
    pub quick_release: bool,
    /// Don't press the wrapped behavior until another key consumes the sticky key
    pub lazy: bool,
    /// Modifier keys don't consume the sticky key
    pub ignore_modifiers: bool,
    /// Layer activated while the sticky key is held
    pub target_layer: u8,
    /// The wrapped behavior, pressed with the binding's modifier
    pub behavior: Behavior,
}

impl Default for StickyKeyLayerConfig {
    fn default() -> Self {
        Self {
            release_after_ms: 1000,
            quick_release: false,
            lazy: false,
            ignore_modifiers: true,
            target_layer: 0,
            behavior: Behavior::KeyPress,
        }
    }
}

impl StickyKeyLayerConfig {
    pub fn release_after(&self) -> Duration {
        Duration::from_millis(self.release_after_ms as u64)
    }

    /// Parameter metadata of the sticky key, proxied from the wrapped behavior.
    ///
    /// The layer is handled by the sticky key itself and never forwarded, so a wrapped behavior
    /// taking a second parameter is unsupported.
    pub fn parameter_metadata(&self) -> Result<ParameterMetadata, StickyKeyError> {
        let child = self.behavior.parameter_metadata();
        if child.param2 != ParameterKind::Unused {
            return Err(StickyKeyError::ChildMetadataUnsupported);
        }
        Ok(child)
    }

    /// Check the config against a keymap with `num_layers` layers
    pub fn validate(&self, num_layers: u8) -> Result<(), StickyKeyError> {
        if self.target_layer >= num_layers {
            return Err(StickyKeyError::InvalidLayer(self.target_layer));
        }
        self.parameter_metadata().map(|_| ())
    }
}

/// Settings shared by all sticky key layer instances
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct StickyKeyLayerSettings {
    /// Number of base language layers, counted from layer 0.
    ///
    /// A key press is switched to the target layer of an armed sticky key only if the layer it
    /// would resolve on is one of these.
    pub language_layers: u8,
}

impl Default for StickyKeyLayerSettings {
    fn default() -> Self {
        Self { language_layers: 2 }
    }
}

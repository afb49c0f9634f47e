//! Layer activation state.
//!
//! All layer changes go through [`LayerState`]. The default layer is always active, it can't be
//! deactivated, neither directly nor by [`LayerState::restore`] or [`LayerState::layer_to`].

use serde::{Deserialize, Serialize};

/// Bitmask of active layers, bit `n` set means layer `n` is active
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const fn contains(self, layer: u8) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }
}

/// Maximum number of layers a [`LayerState`] can track
pub const MAX_LAYERS: usize = 32;

/// Activation state of all layers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerState {
    mask: LayerMask,
    default_layer: u8,
    num_layers: u8,
}

impl LayerState {
    pub fn new(num_layers: u8, default_layer: u8) -> Self {
        let num_layers = num_layers.min(MAX_LAYERS as u8);
        let default_layer = if default_layer < num_layers { default_layer } else { 0 };
        Self {
            mask: LayerMask(1 << default_layer),
            default_layer,
            num_layers,
        }
    }

    pub fn default_layer(&self) -> u8 {
        self.default_layer
    }

    pub fn num_layers(&self) -> u8 {
        self.num_layers
    }

    pub fn is_active(&self, layer: u8) -> bool {
        layer == self.default_layer || self.mask.contains(layer)
    }

    /// Activate given layer, no-op if it's already active
    pub fn activate(&mut self, layer: u8) {
        if layer >= self.num_layers {
            warn!(
                "Not a valid layer {}, keyboard supports only {} layers",
                layer, self.num_layers
            );
            return;
        }
        if !self.is_active(layer) {
            debug!("Activating layer {}", layer);
            self.mask.0 |= 1 << layer;
        }
    }

    /// Deactivate given layer, no-op if it's already inactive or if it's the default layer
    pub fn deactivate(&mut self, layer: u8) {
        if layer >= self.num_layers {
            warn!(
                "Not a valid layer {}, keyboard supports only {} layers",
                layer, self.num_layers
            );
            return;
        }
        if layer == self.default_layer {
            return;
        }
        if self.is_active(layer) {
            debug!("Deactivating layer {}", layer);
            self.mask.0 &= !(1 << layer);
        }
    }

    /// Activation pattern of all layers
    pub fn snapshot(&self) -> LayerMask {
        self.mask
    }

    /// Re-apply the activation pattern of `mask`, layer by layer.
    ///
    /// The default layer stays active whatever `mask` says.
    pub fn restore(&mut self, mask: LayerMask) {
        for layer in 0..self.num_layers {
            let should_be_active = mask.contains(layer);
            let currently_active = self.is_active(layer);
            if should_be_active && !currently_active {
                self.activate(layer);
            } else if !should_be_active && currently_active {
                self.deactivate(layer);
            }
        }
    }

    /// Leave only `layer` and the default layer active
    pub fn layer_to(&mut self, layer: u8) {
        for l in (0..self.num_layers).rev() {
            self.deactivate(l);
        }
        self.activate(layer);
    }

    /// The highest active layer, scanning top-down and stopping at the default layer
    pub fn highest_active(&self) -> u8 {
        (self.default_layer..self.num_layers)
            .rev()
            .find(|&l| self.is_active(l))
            .unwrap_or(self.default_layer)
    }
}

use crate::behavior::{Behavior, Binding};
use crate::layer::{LayerState, MAX_LAYERS};

/// Keymap represents the stack of layers.
///
/// Positions are linear indices into each layer. A pressed position resolves to the binding of the
/// highest active layer which isn't transparent, the lowest checked layer is the default layer. The
/// layer a press resolved on is cached, so that the release of the same position resolves on the
/// same layer even if the layer state changed in between.
pub struct KeyMap<'a, const NUM_KEYS: usize, const NUM_LAYER: usize> {
    /// Layers
    layers: &'a [[Binding; NUM_KEYS]; NUM_LAYER],
    /// Current state of each layer
    layer_state: LayerState,
    /// Layer cache
    layer_cache: [u8; NUM_KEYS],
}

/// Keymap queries and layer state access needed by the behaviors
pub trait Keymap {
    /// The binding placed at `position` on `layer`, without falling through transparent bindings
    fn binding_at(&self, layer: u8, position: u32) -> Option<Binding>;

    fn layers(&self) -> &LayerState;

    fn layers_mut(&mut self) -> &mut LayerState;
}

impl<'a, const NUM_KEYS: usize, const NUM_LAYER: usize> KeyMap<'a, NUM_KEYS, NUM_LAYER> {
    pub fn new(layers: &'a [[Binding; NUM_KEYS]; NUM_LAYER], default_layer: u8) -> Self {
        const { assert!(NUM_LAYER <= MAX_LAYERS, "keymap has more layers than the layer state can track") };
        let layer_state = LayerState::new(NUM_LAYER as u8, default_layer);
        Self {
            layers,
            layer_cache: [layer_state.default_layer(); NUM_KEYS],
            layer_state,
        }
    }

    /// Resolve the binding of a position change, with layer cache
    pub fn resolve(&mut self, position: u32, pressed: bool) -> Binding {
        let pos = position as usize;
        if pos >= NUM_KEYS {
            warn!("Position {} is out of the keymap", position);
            return Binding::none();
        }

        if !pressed {
            // Releasing a pressed key, use cached layer and restore the cache
            let layer = self.layer_cache[pos];
            self.layer_cache[pos] = self.layer_state.default_layer();
            return self.layers[layer as usize][pos];
        }

        // Iterate from higher layer to lower layer, the lowest checked layer is the default layer
        let default_layer = self.layer_state.default_layer();
        for layer_idx in (default_layer as usize..NUM_LAYER).rev() {
            if !self.layer_state.is_active(layer_idx as u8) {
                continue;
            }
            let binding = self.layers[layer_idx][pos];
            if binding.behavior == Behavior::Transparent {
                continue;
            }
            self.layer_cache[pos] = layer_idx as u8;
            return binding;
        }

        Binding::none()
    }
}

impl<const NUM_KEYS: usize, const NUM_LAYER: usize> Keymap for KeyMap<'_, NUM_KEYS, NUM_LAYER> {
    fn binding_at(&self, layer: u8, position: u32) -> Option<Binding> {
        self.layers
            .get(layer as usize)
            .and_then(|l| l.get(position as usize))
            .copied()
    }

    fn layers(&self) -> &LayerState {
        &self.layer_state
    }

    fn layers_mut(&mut self) -> &mut LayerState {
        &mut self.layer_state
    }
}

use super::StickyKeyLayer;
use super::pool::SlotHandle;
use crate::behavior::Behavior;
use crate::event::{EventResult, PositionStateChanged};
use crate::keymap::Keymap;

impl<const N: usize> StickyKeyLayer<'_, N> {
    /// Position listener, runs before the keymap resolves a pressed key.
    ///
    /// If a sticky key is waiting and the pressed key is a plain key press on one of the base
    /// language layers, the layer state is saved and switched to the sticky key's target layer, so
    /// that the key resolves there. The keycode listener restores the saved state once the key was
    /// resolved.
    pub fn on_position_state_changed<K: Keymap>(&mut self, event: &PositionStateChanged, keymap: &mut K) -> EventResult {
        if !event.pressed {
            return EventResult::Bubble;
        }

        let Some(handle) = self.layer_switch_candidate(event.position) else {
            return EventResult::Bubble;
        };
        let Some(key) = self.pool.get_mut(handle) else {
            return EventResult::Bubble;
        };

        let current_layer = keymap.layers().highest_active();
        match keymap.binding_at(current_layer, event.position) {
            Some(binding) if binding.behavior == Behavior::KeyPress => {
                if current_layer < self.settings.language_layers {
                    debug!(
                        "Switching position {} to layer {}, current layer {}",
                        event.position, key.target_layer, current_layer
                    );
                    let layers = keymap.layers_mut();
                    // Keep the oldest snapshot if a previous switch wasn't restored yet
                    key.saved_layer_state.get_or_insert(layers.snapshot());
                    layers.layer_to(key.target_layer);
                } else {
                    debug!(
                        "Not switching position {}, layer {} is not a language layer",
                        event.position, current_layer
                    );
                }
            }
            Some(binding) => debug!(
                "Not switching position {}, bound to {:?}",
                event.position, binding.behavior
            ),
            None => debug!("No binding at position {} on layer {}", event.position, current_layer),
        }

        EventResult::Bubble
    }

    /// The sticky key which switches layers for a key press at `position`.
    ///
    /// Sticky keys which weren't consumed yet are preferred. A consumed sticky key is only a
    /// candidate if `position` is its own.
    fn layer_switch_candidate(&self, position: u32) -> Option<SlotHandle> {
        let mut candidate: Option<(SlotHandle, bool)> = None;
        for handle in self.pool.handles() {
            let Some(key) = self.pool.get(handle) else {
                continue;
            };
            let consumed = key.is_consumed();
            if consumed && key.position != position {
                continue;
            }
            match candidate {
                None => candidate = Some((handle, consumed)),
                Some((_, true)) if !consumed => candidate = Some((handle, consumed)),
                _ => {}
            }
        }
        candidate.map(|(handle, _)| handle)
    }
}

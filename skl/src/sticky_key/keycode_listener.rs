use heapless::Vec;
use skl_types::keycode::is_mod;

use super::pool::SlotHandle;
use super::{Emission, Emissions, StickyKeyLayer, emit};
use crate::event::{EventResult, KeycodeStateChanged};
use crate::keymap::Keymap;
use crate::layer::LayerMask;

impl<const N: usize> StickyKeyLayer<'_, N> {
    /// Keycode listener, correlates keycode events with the held sticky keys.
    ///
    /// On a key press, every waiting sticky key is consumed by the pressed key. On the release of
    /// the consuming key, sticky keys which were already released themselves are released too.
    ///
    /// Emissions are ordered:
    /// 1. presses of the lazy sticky keys consumed by this event
    /// 2. releases of sticky keys which timed out before this event
    /// 3. the event itself, reraised once if any sticky key is released by it
    /// 4. releases of the sticky keys released by this event
    ///
    /// The event is captured if it was reraised, since the reraised copy replaces it.
    pub fn on_keycode_state_changed<K: Keymap>(
        &mut self,
        event: &KeycodeStateChanged,
        keymap: &mut K,
        out: &mut Emissions,
    ) -> EventResult {
        let mut press_before: Vec<SlotHandle, N> = Vec::new();
        let mut release_after: Vec<SlotHandle, N> = Vec::new();
        let mut timed_out: Vec<SlotHandle, N> = Vec::new();
        let mut saved_layer_state: Option<LayerMask> = None;

        for handle in self.pool.handles() {
            if event.is_from(handle) {
                continue;
            }
            let Some(key) = self.pool.get_mut(handle) else {
                continue;
            };

            if event.pressed {
                // The layer switch done for this key press is undone after the key was resolved,
                // whether or not the key consumes the sticky key
                if let Some(saved) = key.saved_layer_state.take() {
                    saved_layer_state.get_or_insert(saved);
                }
                if key.config.ignore_modifiers && is_mod(event.usage_page, event.keycode) {
                    debug!("Modifier key doesn't consume sticky key at {}", key.position);
                    continue;
                }
                if key.is_consumed() {
                    continue;
                }

                let position = key.position;
                let expired = key.release_at.is_some_and(|at| event.timestamp > at);
                let lazy = key.config.lazy;
                let quick_release = key.timer_started && key.config.quick_release;
                if !expired {
                    key.consumed_by = Some(event.usage());
                }

                self.stop_timer(handle);
                if expired {
                    debug!("Sticky key at {} expired before the key press", position);
                    timed_out.push(handle).ok();
                    continue;
                }
                debug!("Sticky key at {} is consumed by {:?}", position, event.usage());
                if lazy {
                    press_before.push(handle).ok();
                }
                if quick_release {
                    release_after.push(handle).ok();
                }
            } else if key.timer_started && key.consumed_by == Some(event.usage()) {
                debug!("Consuming key released, releasing sticky key at {}", key.position);
                self.stop_timer(handle);
                release_after.push(handle).ok();
            }
        }

        let layers = keymap.layers_mut();
        for handle in press_before {
            self.press(handle, event.timestamp, layers, out);
        }
        if let Some(saved) = saved_layer_state {
            debug!("Restoring layer state after key resolution");
            layers.restore(saved);
        }
        for handle in timed_out {
            self.timeout(handle, layers, out);
        }

        if release_after.is_empty() {
            return EventResult::Bubble;
        }
        emit(out, Emission::Reraise(*event));
        for handle in release_after {
            self.release(handle, event.timestamp, layers, out);
        }
        EventResult::Captured
    }
}

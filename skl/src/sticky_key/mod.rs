//! Layer-switching sticky keys.
//!
//! A sticky key layer binding presses a modifier (through a wrapped behavior, usually a key press)
//! and activates a target layer. The modifier stays applied after the sticky key is released, until
//! the next key is pressed and released, or until the release timer expires.
//!
//! While a sticky key waits for the next key, the [position listener](StickyKeyLayer::on_position_state_changed)
//! switches a pressed base layer key to the target layer before the keymap resolves it, so that for
//! instance `Ctrl` + a key on a non-latin layer still sends the latin shortcut.
//!
//! The engine never raises events by itself. Every call which synthesizes events pushes them as
//! [`Emission`]s, in order, and the caller executes them once the call returned. This keeps the
//! engine out of its own event stream while it is mutating its state.

mod invoker;
mod keycode_listener;
pub mod pool;
mod position_listener;
pub mod timer;

use embassy_time::Instant;

use self::pool::{ActiveStickyKey, SlotHandle, StickyKeyPool};
use self::timer::{CancelResult, FiredAction, ReleaseTimers, ScheduleResult};
use crate::behavior::{Binding, BindingEvent, ParameterMetadata};
use crate::config::{StickyKeyLayerConfig, StickyKeyLayerSettings};
use crate::error::StickyKeyError;
use crate::event::{KeycodeStateChanged, Provenance};
use crate::keymap::Keymap;
use crate::layer::LayerState;
use crate::{EMISSION_QUEUE_SIZE, STICKY_KEY_MAX_HELD};
use skl_types::keycode::EncodedKey;

/// An event synthesized by the sticky key engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Emission {
    /// Invoke a binding, as if it was pressed or released at the event's position
    Invoke {
        binding: Binding,
        event: BindingEvent,
        pressed: bool,
        provenance: Provenance,
    },
    /// Deliver the keycode event again, only to the listeners after the sticky key layer
    Reraise(KeycodeStateChanged),
}

/// Emissions of a single engine call
pub type Emissions = heapless::Vec<Emission, EMISSION_QUEUE_SIZE>;

pub(crate) fn emit(out: &mut Emissions, emission: Emission) {
    if out.push(emission).is_err() {
        error!("Sticky key emission queue is full, dropping {:?}", emission);
    }
}

/// The sticky key layer engine, one for all configured instances.
///
/// `N` is the maximum number of sticky keys held at the same time.
pub struct StickyKeyLayer<'a, const N: usize = STICKY_KEY_MAX_HELD> {
    /// Instance configs, indexed by the instance number of [`crate::behavior::Behavior::StickyKeyLayer`]
    configs: &'a [StickyKeyLayerConfig],
    settings: StickyKeyLayerSettings,
    timers: &'a ReleaseTimers<N>,
    pool: StickyKeyPool<'a, N>,
}

impl<'a, const N: usize> StickyKeyLayer<'a, N> {
    pub fn new(
        configs: &'a [StickyKeyLayerConfig],
        settings: StickyKeyLayerSettings,
        timers: &'a ReleaseTimers<N>,
    ) -> Self {
        // A keycode event can press and release every slot, plus one reraise
        const { assert!(2 * N + 1 <= EMISSION_QUEUE_SIZE, "emission queue is too small for the pool") };
        Self {
            configs,
            settings,
            timers,
            pool: StickyKeyPool::new(),
        }
    }

    pub fn timers(&self) -> &'a ReleaseTimers<N> {
        self.timers
    }

    pub fn pool(&self) -> &StickyKeyPool<'a, N> {
        &self.pool
    }

    /// Check every instance config against a keymap with `num_layers` layers
    pub fn validate(&self, num_layers: u8) -> Result<(), StickyKeyError> {
        self.configs.iter().try_for_each(|c| c.validate(num_layers))
    }

    fn config(&self, instance: u8) -> Result<&'a StickyKeyLayerConfig, StickyKeyError> {
        let configs = self.configs;
        configs
            .get(instance as usize)
            .ok_or(StickyKeyError::UnknownInstance(instance))
            .inspect_err(|e| error!("{}", e))
    }

    /// Parameter metadata of a sticky key layer instance, proxied from its wrapped behavior
    pub fn parameter_metadata(&self, instance: u8) -> Result<ParameterMetadata, StickyKeyError> {
        self.config(instance)?.parameter_metadata()
    }

    /// A sticky key layer binding of `instance` is pressed
    pub fn on_binding_pressed<K: Keymap>(
        &mut self,
        instance: u8,
        binding: &Binding,
        event: BindingEvent,
        keymap: &mut K,
        out: &mut Emissions,
    ) -> Result<(), StickyKeyError> {
        let config = self.config(instance)?;
        let layers = keymap.layers_mut();

        if let Some(existing) = self.pool.find(event.position) {
            debug!("Sticky key at {} is pressed again, releasing it first", event.position);
            self.release(existing, event.timestamp, layers, out);
        }

        let timers = self.timers;
        let handle = self
            .pool
            .allocate(
                event.position,
                event.source,
                EncodedKey(binding.param1),
                config,
                layers,
                |i| !timers.is_cancel_pending(i),
            )
            .inspect_err(|e| error!("{}", e))?;

        if config.lazy {
            // Switch the layer now, the modifier waits for the next key
            self.activate_target(handle, layers);
        } else {
            self.press(handle, event.timestamp, layers, out);
        }
        Ok(())
    }

    /// A sticky key layer binding is released
    pub fn on_binding_released<K: Keymap>(
        &mut self,
        event: BindingEvent,
        keymap: &mut K,
        out: &mut Emissions,
    ) -> Result<(), StickyKeyError> {
        let Some(handle) = self.pool.find(event.position) else {
            let e = StickyKeyError::MissingActiveSlot {
                position: event.position,
            };
            error!("{}", e);
            return Err(e);
        };
        let layers = keymap.layers_mut();
        let Some(key) = self.pool.get_mut(handle) else {
            return Ok(());
        };

        if key.is_consumed() {
            debug!("Another key was pressed while the sticky key was held, releasing it");
            self.release(handle, event.timestamp, layers, out);
            return Ok(());
        }

        let release_at = event.timestamp + key.config.release_after();
        key.timer_started = true;
        key.release_at = Some(release_at);
        debug!("Starting release timer of sticky key at {}", event.position);
        if self.timers.schedule(handle, release_at, Instant::now()) == ScheduleResult::Overdue {
            self.timeout(handle, layers, out);
        }
        Ok(())
    }

    /// The release timer of `handle` fired
    pub fn on_timer_fired<K: Keymap>(&mut self, handle: SlotHandle, keymap: &mut K, out: &mut Emissions) {
        match self.timers.take_fired(handle) {
            FiredAction::Timeout => self.timeout(handle, keymap.layers_mut(), out),
            FiredAction::Absorbed => {}
        }
    }

    /// Activate the target layer of the sticky key, if it's not active yet
    pub fn activate_target(&self, handle: SlotHandle, layers: &mut LayerState) {
        let Some(key) = self.pool.get(handle) else {
            return;
        };
        if layers.is_active(key.target_layer) {
            debug!("Target layer {} is already active", key.target_layer);
        } else {
            debug!("Activating target layer {}", key.target_layer);
            layers.activate(key.target_layer);
        }
    }

    /// Deactivate the target layer of the sticky key, unless it was active before the sticky key
    /// was pressed
    pub fn deactivate_target(&self, handle: SlotHandle, layers: &mut LayerState) {
        let Some(key) = self.pool.get(handle) else {
            return;
        };
        if !key.layer_was_active && layers.is_active(key.target_layer) {
            debug!("Deactivating target layer {}", key.target_layer);
            layers.deactivate(key.target_layer);
        } else {
            debug!(
                "Not deactivating target layer {}, was active before: {}",
                key.target_layer, key.layer_was_active
            );
        }
    }

    fn stop_timer(&self, handle: SlotHandle) -> CancelResult {
        self.timers.cancel(handle.index())
    }

    /// Activate the target layer and press the wrapped behavior
    fn press(&mut self, handle: SlotHandle, timestamp: Instant, layers: &mut LayerState, out: &mut Emissions) {
        self.activate_target(handle, layers);
        if let Some(key) = self.pool.get_mut(handle) {
            key.modifier_pressed = true;
            invoker::press(handle, key, timestamp, out);
        }
    }

    /// Restore the layers, free the slot, and release the wrapped behavior if it was pressed
    fn release(&mut self, handle: SlotHandle, timestamp: Instant, layers: &mut LayerState, out: &mut Emissions) {
        match self.clear(handle, layers) {
            Some(key) if key.modifier_pressed => invoker::release(handle, &key, timestamp, out),
            _ => {}
        }
    }

    /// The sticky key wasn't consumed in time
    fn timeout(&mut self, handle: SlotHandle, layers: &mut LayerState, out: &mut Emissions) {
        let Some(key) = self.pool.get(handle).copied() else {
            return;
        };
        debug!("Sticky key at {} timed out", key.position);
        if key.modifier_pressed {
            self.release(handle, key.release_at.unwrap_or_else(Instant::now), layers, out);
        } else {
            // A lazy sticky key which was never consumed leaves no trace
            self.clear(handle, layers);
        }
    }

    /// Stop the timer, restore the layers and free the slot
    fn clear(&mut self, handle: SlotHandle, layers: &mut LayerState) -> Option<ActiveStickyKey<'a>> {
        self.stop_timer(handle);
        if let Some(saved) = self.pool.get_mut(handle).and_then(|k| k.saved_layer_state.take()) {
            layers.restore(saved);
        }
        self.deactivate_target(handle, layers);
        self.pool.release(handle)
    }
}

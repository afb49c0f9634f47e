use core::cell::RefCell;

use embassy_futures::select::{Either, select};
use heapless::Deque;
use skl_types::keycode::EncodedKey;

use crate::behavior::{Behavior, Binding, BindingEvent};
use crate::channel::{KEYCODE_REPORT_CHANNEL, POSITION_EVENT_CHANNEL};
use crate::event::{EventResult, KeycodeStateChanged, PositionStateChanged, Provenance};
use crate::keymap::{KeyMap, Keymap};
use crate::processor::Runnable;
use crate::sticky_key::pool::SlotHandle;
use crate::sticky_key::{Emission, Emissions, StickyKeyLayer};
use crate::{REPORT_CHANNEL_SIZE, STICKY_KEY_MAX_HELD};

/// The keyboard task.
///
/// A position event goes through the sticky key position listener, is resolved by the keymap, and
/// the resolved binding is invoked. Keycode events produced by bindings go through the listener
/// chain, the sticky key layer first, and are reported to [`KEYCODE_REPORT_CHANNEL`] if no listener
/// captured them.
pub struct Keyboard<'a, const NUM_KEYS: usize, const NUM_LAYER: usize, const N: usize = STICKY_KEY_MAX_HELD> {
    /// Keymap
    pub(crate) keymap: &'a RefCell<KeyMap<'a, NUM_KEYS, NUM_LAYER>>,

    /// Sticky key layer engine
    sticky_key: StickyKeyLayer<'a, N>,

    /// Keycode events which passed every listener, waiting to be sent
    reports: Deque<KeycodeStateChanged, REPORT_CHANNEL_SIZE>,
}

impl<const NUM_KEYS: usize, const NUM_LAYER: usize, const N: usize> Runnable for Keyboard<'_, NUM_KEYS, NUM_LAYER, N> {
    /// Main keyboard processing task, it processes position events and fired release timers in
    /// arrival order.
    async fn run(&mut self) -> ! {
        let timers = self.sticky_key.timers();
        loop {
            match select(POSITION_EVENT_CHANNEL.receive(), timers.fired()).await {
                Either::First(event) => self.process_position_event(event),
                Either::Second(handle) => self.process_timer_fired(handle),
            }
            self.flush_reports().await;
        }
    }
}

impl<'a, const NUM_KEYS: usize, const NUM_LAYER: usize, const N: usize> Keyboard<'a, NUM_KEYS, NUM_LAYER, N> {
    pub fn new(keymap: &'a RefCell<KeyMap<'a, NUM_KEYS, NUM_LAYER>>, sticky_key: StickyKeyLayer<'a, N>) -> Self {
        if let Err(e) = sticky_key.validate(NUM_LAYER as u8) {
            error!("Invalid sticky key layer config: {}", e);
        }
        Self {
            keymap,
            sticky_key,
            reports: Deque::new(),
        }
    }

    /// Process a physical key change
    pub fn process_position_event(&mut self, event: PositionStateChanged) {
        debug!("Processing position event: {:?}", event);
        let keymap = self.keymap;
        let mut keymap = keymap.borrow_mut();

        // The sticky key layer may switch layers before the key is resolved
        self.sticky_key.on_position_state_changed(&event, &mut *keymap);
        let binding = keymap.resolve(event.position, event.pressed);
        self.invoke_binding(&mut keymap, binding, BindingEvent::from(&event), event.pressed, Provenance::Keymap);
    }

    /// Process a fired sticky key release timer
    pub fn process_timer_fired(&mut self, handle: SlotHandle) {
        let keymap = self.keymap;
        let mut keymap = keymap.borrow_mut();
        let mut out = Emissions::new();
        self.sticky_key.on_timer_fired(handle, &mut *keymap, &mut out);
        self.apply_emissions(&mut keymap, out);
    }

    /// Send the keycode events reported so far
    pub async fn flush_reports(&mut self) {
        while let Some(event) = self.reports.pop_front() {
            KEYCODE_REPORT_CHANNEL.send(event).await;
        }
    }

    fn invoke_binding(
        &mut self,
        keymap: &mut KeyMap<'a, NUM_KEYS, NUM_LAYER>,
        binding: Binding,
        event: BindingEvent,
        pressed: bool,
        provenance: Provenance,
    ) {
        match binding.behavior {
            Behavior::None | Behavior::Transparent => {}
            Behavior::KeyPress => {
                let keycode_event =
                    KeycodeStateChanged::from_encoded(EncodedKey(binding.param1), pressed, event.timestamp, provenance);
                self.dispatch_keycode(keymap, keycode_event);
            }
            Behavior::MomentaryLayer => {
                let layer = binding.param1 as u8;
                if pressed {
                    keymap.layers_mut().activate(layer);
                } else {
                    keymap.layers_mut().deactivate(layer);
                }
            }
            Behavior::ToLayer => {
                if pressed {
                    keymap.layers_mut().layer_to(binding.param1 as u8);
                }
            }
            Behavior::StickyKeyLayer(instance) => {
                let mut out = Emissions::new();
                let result = if pressed {
                    self.sticky_key
                        .on_binding_pressed(instance, &binding, event, keymap, &mut out)
                } else {
                    self.sticky_key.on_binding_released(event, keymap, &mut out)
                };
                if result.is_err() {
                    // Already logged by the engine
                    trace!("Sticky key layer binding at {} is a no-op", event.position);
                }
                self.apply_emissions(keymap, out);
            }
        }
    }

    /// Deliver a keycode event to the listener chain
    fn dispatch_keycode(&mut self, keymap: &mut KeyMap<'a, NUM_KEYS, NUM_LAYER>, event: KeycodeStateChanged) {
        let mut out = Emissions::new();
        let result = self.sticky_key.on_keycode_state_changed(&event, keymap, &mut out);
        self.apply_emissions(keymap, out);
        if result == EventResult::Bubble {
            self.report(event);
        }
    }

    fn apply_emissions(&mut self, keymap: &mut KeyMap<'a, NUM_KEYS, NUM_LAYER>, out: Emissions) {
        for emission in out {
            match emission {
                Emission::Invoke {
                    binding,
                    event,
                    pressed,
                    provenance,
                } => self.invoke_binding(keymap, binding, event, pressed, provenance),
                // The report listener is the only one after the sticky key layer
                Emission::Reraise(event) => self.report(event),
            }
        }
    }

    /// The report listener, last of the chain
    fn report(&mut self, event: KeycodeStateChanged) {
        debug!("Reporting keycode event: {:?}", event);
        if self.reports.push_back(event).is_err() {
            error!("Report queue is full, dropping {:?}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;
    use skl_types::keycode::HidKeyCode;

    use super::*;
    use crate::config::{StickyKeyLayerConfig, StickyKeyLayerSettings};
    use crate::sticky_key::timer::ReleaseTimers;
    use crate::{kp, mo, skl, to, trans};

    static LAYERS: [[Binding; 4]; 3] = [
        [skl!(0, LCtrl, 0), kp!(A), mo!(2), skl!(1, LShift, 0)],
        [trans!(), kp!(F), trans!(), trans!()],
        [trans!(), kp!(F1), trans!(), trans!()],
    ];

    static CONFIGS: [StickyKeyLayerConfig; 2] = [
        StickyKeyLayerConfig {
            release_after_ms: 1000,
            quick_release: false,
            lazy: false,
            ignore_modifiers: true,
            target_layer: 0,
            behavior: Behavior::KeyPress,
        },
        StickyKeyLayerConfig {
            release_after_ms: 1000,
            quick_release: false,
            lazy: true,
            ignore_modifiers: true,
            target_layer: 0,
            behavior: Behavior::KeyPress,
        },
    ];

    fn create_test_keyboard() -> Keyboard<'static, 4, 3, 4> {
        create_keyboard_with(&LAYERS)
    }

    fn create_keyboard_with(layers: &'static [[Binding; 4]; 3]) -> Keyboard<'static, 4, 3, 4> {
        let keymap = Box::leak(Box::new(RefCell::new(KeyMap::new(layers, 0))));
        let timers: &'static ReleaseTimers<4> = Box::leak(Box::new(ReleaseTimers::new()));
        Keyboard::new(
            keymap,
            StickyKeyLayer::new(&CONFIGS, StickyKeyLayerSettings::default(), timers),
        )
    }

    fn press(keyboard: &mut Keyboard<'static, 4, 3, 4>, position: u32, pressed: bool, ms: u64) {
        keyboard.process_position_event(PositionStateChanged::new(position, pressed, Instant::from_millis(ms)));
    }

    fn reports(keyboard: &mut Keyboard<'static, 4, 3, 4>) -> Vec<(HidKeyCode, bool)> {
        let mut out = Vec::new();
        while let Some(event) = keyboard.reports.pop_front() {
            out.push((HidKeyCode::from_repr(event.keycode as u8).unwrap(), event.pressed));
        }
        out
    }

    #[test]
    fn test_sticky_key_wraps_next_key() {
        let mut keyboard = create_test_keyboard();
        press(&mut keyboard, 0, true, 0);
        press(&mut keyboard, 0, false, 10);
        assert_eq!(reports(&mut keyboard), vec![(HidKeyCode::LCtrl, true)]);

        press(&mut keyboard, 1, true, 100);
        press(&mut keyboard, 1, false, 150);
        assert_eq!(
            reports(&mut keyboard),
            vec![(HidKeyCode::A, true), (HidKeyCode::A, false), (HidKeyCode::LCtrl, false)]
        );
    }

    #[test]
    fn test_lazy_sticky_key_presses_before_key() {
        let mut keyboard = create_test_keyboard();
        press(&mut keyboard, 3, true, 0);
        press(&mut keyboard, 3, false, 10);
        assert_eq!(reports(&mut keyboard), vec![]);

        press(&mut keyboard, 1, true, 100);
        press(&mut keyboard, 1, false, 150);
        assert_eq!(
            reports(&mut keyboard),
            vec![
                (HidKeyCode::LShift, true),
                (HidKeyCode::A, true),
                (HidKeyCode::A, false),
                (HidKeyCode::LShift, false),
            ]
        );
    }

    #[test]
    fn test_key_resolves_on_target_layer() {
        let mut keyboard = create_test_keyboard();
        keyboard.keymap.borrow_mut().layers_mut().activate(1);

        // Without sticky key, the second language layer is used
        press(&mut keyboard, 1, true, 0);
        press(&mut keyboard, 1, false, 10);
        assert_eq!(reports(&mut keyboard), vec![(HidKeyCode::F, true), (HidKeyCode::F, false)]);

        press(&mut keyboard, 0, true, 100);
        press(&mut keyboard, 0, false, 110);
        press(&mut keyboard, 1, true, 200);
        assert!(keyboard.keymap.borrow().layers().is_active(1));
        press(&mut keyboard, 1, false, 250);
        assert_eq!(
            reports(&mut keyboard),
            vec![
                (HidKeyCode::LCtrl, true),
                (HidKeyCode::A, true),
                (HidKeyCode::A, false),
                (HidKeyCode::LCtrl, false),
            ]
        );
        assert!(keyboard.keymap.borrow().layers().is_active(1));
    }

    #[test]
    fn test_momentary_layer_consumes_nothing() {
        let mut keyboard = create_test_keyboard();
        press(&mut keyboard, 0, true, 0);
        press(&mut keyboard, 0, false, 10);
        reports(&mut keyboard);

        // A layer key doesn't produce a keycode event, the sticky key keeps waiting
        press(&mut keyboard, 2, true, 100);
        press(&mut keyboard, 1, true, 110);
        press(&mut keyboard, 1, false, 120);
        press(&mut keyboard, 2, false, 130);
        assert_eq!(
            reports(&mut keyboard),
            vec![(HidKeyCode::F1, true), (HidKeyCode::F1, false), (HidKeyCode::LCtrl, false)]
        );
    }

    #[test]
    fn test_two_sticky_keys() {
        let mut keyboard = create_test_keyboard();
        press(&mut keyboard, 0, true, 0);
        press(&mut keyboard, 0, false, 10);
        // The modifier of the lazy sticky key is ignored by the first one
        press(&mut keyboard, 3, true, 20);
        press(&mut keyboard, 3, false, 30);
        press(&mut keyboard, 1, true, 100);
        press(&mut keyboard, 1, false, 150);
        assert_eq!(
            reports(&mut keyboard),
            vec![
                (HidKeyCode::LCtrl, true),
                (HidKeyCode::LShift, true),
                (HidKeyCode::A, true),
                (HidKeyCode::A, false),
                (HidKeyCode::LCtrl, false),
                (HidKeyCode::LShift, false),
            ]
        );
    }

    #[test]
    fn test_to_layer_then_sticky_key() {
        static TO_LAYERS: [[Binding; 4]; 3] = [
            [skl!(0, LCtrl, 0), kp!(A), to!(1), trans!()],
            [trans!(), kp!(F), trans!(), to!(0)],
            [trans!(), kp!(F1), trans!(), trans!()],
        ];
        let mut keyboard = create_keyboard_with(&TO_LAYERS);

        press(&mut keyboard, 2, true, 0);
        press(&mut keyboard, 2, false, 10);
        assert!(keyboard.keymap.borrow().layers().is_active(1));
        press(&mut keyboard, 1, true, 20);
        press(&mut keyboard, 1, false, 30);
        assert_eq!(reports(&mut keyboard), vec![(HidKeyCode::F, true), (HidKeyCode::F, false)]);

        // The sticky key switches the key back to layer 0, layer 1 stays selected
        press(&mut keyboard, 0, true, 100);
        press(&mut keyboard, 0, false, 110);
        press(&mut keyboard, 1, true, 200);
        press(&mut keyboard, 1, false, 250);
        assert_eq!(
            reports(&mut keyboard),
            vec![
                (HidKeyCode::LCtrl, true),
                (HidKeyCode::A, true),
                (HidKeyCode::A, false),
                (HidKeyCode::LCtrl, false),
            ]
        );
        assert!(keyboard.keymap.borrow().layers().is_active(1));

        press(&mut keyboard, 3, true, 300);
        press(&mut keyboard, 3, false, 310);
        assert!(!keyboard.keymap.borrow().layers().is_active(1));
        press(&mut keyboard, 1, true, 320);
        press(&mut keyboard, 1, false, 330);
        assert_eq!(reports(&mut keyboard), vec![(HidKeyCode::A, true), (HidKeyCode::A, false)]);
    }

    #[test]
    fn test_split_source_reaches_sticky_key() {
        let mut keyboard = create_test_keyboard();
        keyboard.process_position_event(PositionStateChanged::new(0, true, Instant::from_millis(0)).with_source(1));
        let pool = keyboard.sticky_key.pool();
        let key = pool.find(0).and_then(|h| pool.get(h).copied()).unwrap();
        assert_eq!(key.source, Some(1));

        keyboard.process_position_event(PositionStateChanged::new(0, false, Instant::from_millis(10)).with_source(1));
        press(&mut keyboard, 1, true, 100);
        press(&mut keyboard, 1, false, 150);
        assert_eq!(
            reports(&mut keyboard),
            vec![
                (HidKeyCode::LCtrl, true),
                (HidKeyCode::A, true),
                (HidKeyCode::A, false),
                (HidKeyCode::LCtrl, false),
            ]
        );
        assert!(keyboard.sticky_key.pool().is_empty());
    }

    #[test]
    fn test_failed_sticky_binding_is_a_no_op() {
        let mut keyboard = create_test_keyboard();
        // Release without a tracked press
        press(&mut keyboard, 0, false, 0);
        assert_eq!(reports(&mut keyboard), vec![]);
        assert!(keyboard.sticky_key.pool().is_empty());

        press(&mut keyboard, 1, true, 10);
        press(&mut keyboard, 1, false, 20);
        assert_eq!(reports(&mut keyboard), vec![(HidKeyCode::A, true), (HidKeyCode::A, false)]);
    }
}

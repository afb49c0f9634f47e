pub mod test_macro;

use core::cell::RefCell;
use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll, Waker};

use embassy_futures::join::join;
use embassy_futures::select::select;
use embassy_time::{Duration, Instant, MockDriver, Timer};
use log::debug;
use skl::behavior::Binding;
use skl::channel::{KEYCODE_REPORT_CHANNEL, POSITION_EVENT_CHANNEL};
use skl::config::{StickyKeyLayerConfig, StickyKeyLayerSettings};
use skl::event::PositionStateChanged;
use skl::keyboard::Keyboard;
use skl::keymap::{KeyMap, Keymap};
use skl::processor::Runnable;
use skl::sticky_key::StickyKeyLayer;
use skl::sticky_key::timer::{ReleaseTimerTask, ReleaseTimers};
use skl::types::keycode::HidKeyCode;

// Init logger for tests
#[ctor::ctor]
pub fn init_log() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Time left for release timers to fire after the last key of a sequence
const SETTLE_TIME: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct TestKeyPress {
    pub position: u32,
    pub pressed: bool,
    pub delay: u64, // Delay before this key event in milliseconds
}

/// Run a future to completion on the mock clock.
///
/// Every time the future is pending, the clock advances by one millisecond, so timers fire in
/// order and without waiting for real time.
pub fn test_block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        MockDriver::get().advance(Duration::from_millis(1));
    }
}

// Run the keyboard and its timer task, send the key sequence with delays, then check every
// reported keycode event
pub async fn run_key_sequence_test<const NUM_KEYS: usize, const NUM_LAYER: usize, const N: usize>(
    keyboard: &mut Keyboard<'static, NUM_KEYS, NUM_LAYER, N>,
    timer_task: &mut ReleaseTimerTask<'static, N>,
    key_sequence: &[TestKeyPress],
    expected_reports: &[(HidKeyCode, bool)],
) {
    POSITION_EVENT_CHANNEL.clear();
    KEYCODE_REPORT_CHANNEL.clear();
    let reports: RefCell<Vec<(HidKeyCode, bool)>> = RefCell::new(Vec::new());

    select(
        join(keyboard.run(), timer_task.run()),
        select(
            // Send all key events with delays
            async {
                for key in key_sequence {
                    Timer::after(Duration::from_millis(key.delay)).await;
                    POSITION_EVENT_CHANNEL
                        .send(PositionStateChanged::new(key.position, key.pressed, Instant::now()))
                        .await;
                }
                Timer::after(SETTLE_TIME).await;
            },
            // Collect reports
            async {
                loop {
                    let event = KEYCODE_REPORT_CHANNEL.receive().await;
                    debug!("Received report {:?}", event);
                    let keycode = HidKeyCode::from_repr(event.keycode as u8).unwrap_or(HidKeyCode::No);
                    reports.borrow_mut().push((keycode, event.pressed));
                }
            },
        ),
    )
    .await;

    assert_eq!(
        reports.into_inner(),
        expected_reports,
        "expected left but actually right"
    );
}

pub fn wrap_keymap<const NUM_KEYS: usize, const NUM_LAYER: usize>(
    keymap: [[Binding; NUM_KEYS]; NUM_LAYER],
    active_layers: &[u8],
) -> &'static RefCell<KeyMap<'static, NUM_KEYS, NUM_LAYER>> {
    // Box::leak is acceptable in tests
    let leaked_layers = Box::leak(Box::new(keymap));
    let mut keymap = KeyMap::new(leaked_layers, 0);
    for layer in active_layers {
        keymap.layers_mut().activate(*layer);
    }
    Box::leak(Box::new(RefCell::new(keymap)))
}

pub fn create_test_keyboard<const NUM_KEYS: usize, const NUM_LAYER: usize, const N: usize>(
    keymap: [[Binding; NUM_KEYS]; NUM_LAYER],
    configs: &'static [StickyKeyLayerConfig],
    active_layers: &[u8],
) -> (Keyboard<'static, NUM_KEYS, NUM_LAYER, N>, ReleaseTimerTask<'static, N>) {
    let timers: &'static ReleaseTimers<N> = Box::leak(Box::new(ReleaseTimers::new()));
    let sticky_key = StickyKeyLayer::new(configs, StickyKeyLayerSettings::default(), timers);
    (
        Keyboard::new(wrap_keymap(keymap, active_layers), sticky_key),
        ReleaseTimerTask::new(timers),
    )
}

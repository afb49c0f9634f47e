extern crate skl;

/// Run a key sequence on a test keyboard and check the reported keycode events.
///
/// Each key of the sequence is `[position, pressed, delay before the event in ms]`, each expected
/// report is `[HidKeyCode variant, pressed]`.
#[macro_export]
macro_rules! key_sequence_test {
    (keyboard: $keyboard:expr, sequence: [$([$position:expr, $pressed:expr, $delay:expr]),* $(,)?], expected_reports: [$([$key:ident, $key_pressed:expr]),* $(,)?]) => {
        $crate::common::test_block_on(async {
            let (mut keyboard, mut timer_task) = $keyboard;
            let sequence = [
                $(
                    $crate::common::TestKeyPress {
                        position: $position,
                        pressed: $pressed,
                        delay: $delay,
                    },
                )*
            ];
            let expected_reports = [
                $(
                    (skl::types::keycode::HidKeyCode::$key, $key_pressed),
                )*
            ];

            $crate::common::run_key_sequence_test(&mut keyboard, &mut timer_task, &sequence, &expected_reports).await;
        })
    };
}

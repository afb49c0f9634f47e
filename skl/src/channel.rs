//! Exposed channels which can be used to share events across tasks

use embassy_sync::channel::Channel;

use crate::event::{KeycodeStateChanged, PositionStateChanged};
use crate::{EVENT_CHANNEL_SIZE, REPORT_CHANNEL_SIZE, RawMutex};

/// Channel for physical key events, from the matrix to the keyboard task
pub static POSITION_EVENT_CHANNEL: Channel<RawMutex, PositionStateChanged, EVENT_CHANNEL_SIZE> = Channel::new();
/// Channel for keycode events which passed every listener, from the keyboard task to the HID layer
pub static KEYCODE_REPORT_CHANNEL: Channel<RawMutex, KeycodeStateChanged, REPORT_CHANNEL_SIZE> = Channel::new();

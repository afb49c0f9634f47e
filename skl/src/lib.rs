//! # skl
//!
//! Layer-switching sticky keys for embassy based keyboard firmware.
//!
//! A sticky key layer binding (`&skl LCTRL ENG` in keymap terms) applies a modifier to the next key
//! pressed after it and, for the duration, lets that key resolve on a target overlay layer. The
//! engine lives in [`sticky_key`]; [`keyboard::Keyboard`] wires it between the position events
//! coming from the matrix, the keymap, and the keycode events going to the HID layer.
//!
//! Two tasks are needed at runtime:
//!
//! - [`keyboard::Keyboard`], which consumes [`channel::POSITION_EVENT_CHANNEL`] and publishes
//!   keycode events to [`channel::KEYCODE_REPORT_CHANNEL`]
//! - [`sticky_key::timer::ReleaseTimerTask`], which fires the release timers of idle sticky keys
//!
//! ```rust,ignore
//! let timers = TIMERS.init(ReleaseTimers::new());
//! let keymap = KEYMAP.init(RefCell::new(KeyMap::new(&LAYERS, 0)));
//! let mut keyboard = Keyboard::new(keymap, StickyKeyLayer::new(&SKL_CONFIGS, settings, timers));
//! let mut timer_task = ReleaseTimerTask::new(timers);
//! join(keyboard.run(), timer_task.run()).await;
//! ```
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod behavior;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod keyboard;
pub mod keymap;
pub mod layer;
pub mod processor;
pub mod sticky_key;

pub use skl_types as types;

/// Maximum number of sticky keys that can be held (armed or consumed) at the same time
pub const STICKY_KEY_MAX_HELD: usize = 10;
/// Capacity of the position event channel
pub const EVENT_CHANNEL_SIZE: usize = 16;
/// Capacity of the keycode report channel
pub const REPORT_CHANNEL_SIZE: usize = 32;
/// Capacity of the synthesized event queue filled by one engine call
pub const EMISSION_QUEUE_SIZE: usize = 32;

pub type RawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

//! HID keycodes and encoded key usages.
//!
//! Key press bindings carry a single `u32` parameter, the encoded usage, laid out as:
//!
//! | bits 31..24 | bits 23..16 | bits 15..0 |
//! | --- | --- | --- |
//! | implicit modifiers | usage page | usage id |

use serde::{Deserialize, Serialize};
use strum::FromRepr;

use crate::modifier::HidModifiers;

/// HID usage page of keyboard/keypad keys
pub const HID_USAGE_KEY: u8 = 0x07;
/// HID usage page of consumer control keys
pub const HID_USAGE_CONSUMER: u8 = 0x0C;

/// Returns `true` if `(usage_page, keycode)` is one of the eight modifier keys
pub fn is_mod(usage_page: u8, keycode: u32) -> bool {
    usage_page == HID_USAGE_KEY && (HidKeyCode::LCtrl as u32..=HidKeyCode::RGui as u32).contains(&keycode)
}

/// Keyboard/keypad page key codes used by the firmware
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidKeyCode {
    /// Reserved, no-key.
    No = 0x00,
    A = 0x04,
    B = 0x05,
    C = 0x06,
    D = 0x07,
    E = 0x08,
    F = 0x09,
    G = 0x0A,
    H = 0x0B,
    I = 0x0C,
    J = 0x0D,
    K = 0x0E,
    L = 0x0F,
    M = 0x10,
    N = 0x11,
    O = 0x12,
    P = 0x13,
    Q = 0x14,
    R = 0x15,
    S = 0x16,
    T = 0x17,
    U = 0x18,
    V = 0x19,
    W = 0x1A,
    X = 0x1B,
    Y = 0x1C,
    Z = 0x1D,
    Kc1 = 0x1E,
    Kc2 = 0x1F,
    Kc3 = 0x20,
    Kc4 = 0x21,
    Kc5 = 0x22,
    Kc6 = 0x23,
    Kc7 = 0x24,
    Kc8 = 0x25,
    Kc9 = 0x26,
    Kc0 = 0x27,
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    LeftBracket = 0x2F,
    RightBracket = 0x30,
    Backslash = 0x31,
    Semicolon = 0x33,
    Quote = 0x34,
    Grave = 0x35,
    Comma = 0x36,
    Dot = 0x37,
    Slash = 0x38,
    CapsLock = 0x39,
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,
    Delete = 0x4C,
    Right = 0x4F,
    Left = 0x50,
    Down = 0x51,
    Up = 0x52,
    /// Left Control
    LCtrl = 0xE0,
    /// Left Shift
    LShift = 0xE1,
    /// Left Alt
    LAlt = 0xE2,
    /// Left GUI
    LGui = 0xE3,
    /// Right Control
    RCtrl = 0xE4,
    /// Right Shift
    RShift = 0xE5,
    /// Right Alt
    RAlt = 0xE6,
    /// Right GUI
    RGui = 0xE7,
}

impl HidKeyCode {
    /// Returns `true` if the keycode is a modifier keycode
    pub fn is_modifier(self) -> bool {
        HidKeyCode::LCtrl <= self && self <= HidKeyCode::RGui
    }
}

/// An encoded key usage: usage page, usage id and the modifiers implied by the key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodedKey(pub u32);

impl EncodedKey {
    pub const fn new(usage_page: u8, usage_id: u16, implicit_modifiers: HidModifiers) -> Self {
        Self(((implicit_modifiers.into_bits() as u32) << 24) | ((usage_page as u32) << 16) | usage_id as u32)
    }

    /// Encode a key of the keyboard/keypad page
    pub const fn key(keycode: HidKeyCode) -> Self {
        Self::new(HID_USAGE_KEY, keycode as u16, HidModifiers::new())
    }

    /// Same usage, with `modifiers` added to the implicit modifiers
    pub const fn with_modifiers(self, modifiers: HidModifiers) -> Self {
        Self(self.0 | ((modifiers.into_bits() as u32) << 24))
    }

    pub const fn usage_page(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    pub const fn usage_id(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub const fn implicit_modifiers(self) -> HidModifiers {
        HidModifiers::from_bits((self.0 >> 24) as u8)
    }

    /// Returns `true` if the usage itself is a modifier key
    pub fn is_modifier(self) -> bool {
        is_mod(self.usage_page(), self.usage_id() as u32)
    }
}

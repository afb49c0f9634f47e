//! # skl types
//!
//! Value types shared between the `skl` firmware crate and host side tooling.
//!
//! - [`keycode`] - HID keycodes and the encoded key usage carried by key press bindings
//! - [`modifier`] - The HID modifier byte

#![no_std]

pub mod keycode;
pub mod modifier;

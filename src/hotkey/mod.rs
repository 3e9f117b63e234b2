//! Hotkey module for reading key transitions from an input device
//!
//! Uses the kernel evdev interface to receive raw key events and decodes
//! them into press/release transitions.

mod keys;
mod listener;

pub use keys::{display_name, parse_key, KeyEvent, TriggerPolicy, KEY_MAX};
pub use listener::{validate_device, DeviceAccess, EvdevAccess, InputSource, SourceError};

#[cfg(test)]
pub use keys::Transition;
#[cfg(test)]
pub use listener::testing;

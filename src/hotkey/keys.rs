//! Key code definitions and transition decoding
//!
//! Turns raw evdev events into press/release transitions, decides which
//! transitions fire an action, and resolves key codes to their kernel names.

use std::fmt;
use std::str::FromStr;

use evdev::{InputEvent, InputEventKind, Key};
use serde::Deserialize;

/// Highest key code the kernel reports (`KEY_MAX` in `linux/input-event-codes.h`)
pub const KEY_MAX: u16 = 0x2ff;

/// Placeholder printed for codes without a known name
pub const UNKNOWN_KEY_NAME: &str = "?";

/// Edge of a key, as reported by the `value` field of an `EV_KEY` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Key went down
    Pressed,
    /// Key went up
    Released,
    /// Autorepeat or any other state; carries the raw value
    Repeat(i32),
}

impl Transition {
    /// Decode the raw key state value
    pub fn from_value(value: i32) -> Self {
        match value {
            0 => Self::Released,
            1 => Self::Pressed,
            other => Self::Repeat(other),
        }
    }
}

/// A decoded key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u16,
    pub transition: Transition,
}

impl KeyEvent {
    pub fn new(code: u16, transition: Transition) -> Self {
        Self { code, transition }
    }

    /// Decode an input event, returning `None` for anything that is not `EV_KEY`
    pub fn from_input(event: &InputEvent) -> Option<Self> {
        match event.kind() {
            InputEventKind::Key(key) => {
                Some(Self::new(key.code(), Transition::from_value(event.value())))
            }
            _ => None,
        }
    }
}

/// Which transition fires a key's action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TriggerPolicy {
    #[serde(rename = "press")]
    OnPress,
    #[default]
    #[serde(rename = "release")]
    OnRelease,
}

impl TriggerPolicy {
    /// Check if `transition` fires under this policy. Repeats never fire.
    pub fn fires(self, transition: Transition) -> bool {
        matches!(
            (self, transition),
            (Self::OnPress, Transition::Pressed) | (Self::OnRelease, Transition::Released)
        )
    }
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnPress => write!(f, "press"),
            Self::OnRelease => write!(f, "release"),
        }
    }
}

/// Resolve a key code to its kernel name, e.g. `KEY_ENTER`
pub fn key_name(code: u16) -> Option<String> {
    if code > KEY_MAX {
        return None;
    }
    // evdev's Debug output is the kernel name for known codes; anything it
    // cannot parse back is a placeholder for an unnamed code.
    let name = format!("{:?}", Key::new(code));
    Key::from_str(&name).is_ok().then_some(name)
}

/// Name to print for `code`, falling back to [`UNKNOWN_KEY_NAME`]
pub fn display_name(code: u16) -> String {
    key_name(code).unwrap_or_else(|| UNKNOWN_KEY_NAME.to_string())
}

/// Parse a key given as `KEY_ENTER`, `enter`, `BTN_LEFT` or a decimal code
pub fn parse_key(input: &str) -> Option<u16> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(code) = input.parse::<u16>() {
        return (code <= KEY_MAX).then_some(code);
    }

    let upper = input.to_ascii_uppercase();
    let name = if upper.starts_with("KEY_") || upper.starts_with("BTN_") {
        upper
    } else {
        format!("KEY_{upper}")
    };

    Key::from_str(&name)
        .ok()
        .map(|key| key.code())
        .filter(|code| *code <= KEY_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    #[test]
    fn test_transition_from_value() {
        assert_eq!(Transition::from_value(1), Transition::Pressed);
        assert_eq!(Transition::from_value(0), Transition::Released);
        assert_eq!(Transition::from_value(2), Transition::Repeat(2));
    }

    #[test]
    fn test_decode_key_event() {
        let raw = InputEvent::new(EventType::KEY, Key::KEY_A.code(), 1);
        let event = KeyEvent::from_input(&raw).unwrap();
        assert_eq!(event.code, Key::KEY_A.code());
        assert_eq!(event.transition, Transition::Pressed);
    }

    #[test]
    fn test_non_key_events_are_not_decoded() {
        let sync = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        assert!(KeyEvent::from_input(&sync).is_none());

        let rel = InputEvent::new(EventType::RELATIVE, 0, 5);
        assert!(KeyEvent::from_input(&rel).is_none());
    }

    #[test]
    fn test_press_policy() {
        let policy = TriggerPolicy::OnPress;
        assert!(policy.fires(Transition::Pressed));
        assert!(!policy.fires(Transition::Released));
        assert!(!policy.fires(Transition::Repeat(2)));
    }

    #[test]
    fn test_release_policy() {
        let policy = TriggerPolicy::OnRelease;
        assert!(policy.fires(Transition::Released));
        assert!(!policy.fires(Transition::Pressed));
        assert!(!policy.fires(Transition::Repeat(2)));
    }

    #[test]
    fn test_default_policy_is_release() {
        assert_eq!(TriggerPolicy::default(), TriggerPolicy::OnRelease);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(Key::KEY_ENTER.code()).as_deref(), Some("KEY_ENTER"));
        assert_eq!(display_name(Key::KEY_A.code()), "KEY_A");
    }

    #[test]
    fn test_unknown_codes_fall_back() {
        assert_eq!(key_name(KEY_MAX + 1), None);
        assert_eq!(display_name(u16::MAX), UNKNOWN_KEY_NAME);
        assert_eq!(display_name(0x2f5), UNKNOWN_KEY_NAME);
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("KEY_ENTER"), Some(Key::KEY_ENTER.code()));
        assert_eq!(parse_key("enter"), Some(Key::KEY_ENTER.code()));
        assert_eq!(parse_key(" key_f13 "), Some(Key::KEY_F13.code()));
        assert_eq!(parse_key("BTN_LEFT"), Some(Key::BTN_LEFT.code()));
        assert_eq!(parse_key("30"), Some(30));
    }

    #[test]
    fn test_parse_key_rejects_garbage() {
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("not_a_key"), None);
        assert_eq!(parse_key("800"), None);
    }
}

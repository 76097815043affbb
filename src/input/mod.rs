//! Input gating for push-to-talk capture.

pub mod hotkey;

pub use hotkey::{HotkeyEvent, PushToTalkMonitor};

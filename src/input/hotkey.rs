//! Push-to-talk key monitoring.
//!
//! A global key hook (rdev) on a dedicated thread; the configured key held
//! down gates audio capture. Key auto-repeat delivers a stream of press
//! events, so presses are coalesced into a single `AudioStart` until the
//! matching release.

use rdev::{Event, EventType, Key, listen};
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Capture gating events derived from the push-to-talk key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// Key went down; start capturing.
    AudioStart,
    /// Key came up; stop capturing and finalize the take.
    AudioEnd,
}

/// Raw platform codes for keys rdev names, so configs can use one numeric
/// code regardless of whether rdev resolves the key or reports `Unknown`.
const NAMED_KEY_CODES: &[(u16, Key)] = &[
    (29, Key::ControlLeft),
    (42, Key::ShiftLeft),
    (56, Key::Alt),
    (57, Key::Space),
    (97, Key::ControlRight),
    (100, Key::AltGr),
];

fn key_matches(key: Key, code: u16) -> bool {
    if let Key::Unknown(raw) = key {
        return raw == code as u32;
    }
    NAMED_KEY_CODES
        .iter()
        .any(|&(named_code, named_key)| named_code == code && named_key == key)
}

/// Press/release tracker that coalesces auto-repeat into edges.
struct KeyTracker {
    code: u16,
    pressed: bool,
}

impl KeyTracker {
    fn new(code: u16) -> Self {
        Self {
            code,
            pressed: false,
        }
    }

    fn on_event(&mut self, event_type: &EventType) -> Option<HotkeyEvent> {
        match event_type {
            EventType::KeyPress(key) if key_matches(*key, self.code) => {
                if self.pressed {
                    None // auto-repeat
                } else {
                    self.pressed = true;
                    Some(HotkeyEvent::AudioStart)
                }
            }
            EventType::KeyRelease(key) if key_matches(*key, self.code) => {
                if self.pressed {
                    self.pressed = false;
                    Some(HotkeyEvent::AudioEnd)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Global push-to-talk monitor.
pub struct PushToTalkMonitor {
    key_code: u16,
}

impl PushToTalkMonitor {
    /// Monitor the key with the given raw platform code.
    pub fn new(key_code: u16) -> Self {
        Self { key_code }
    }

    /// Start the global listener on its own thread.
    ///
    /// The listener runs for the life of the process (rdev offers no stop
    /// API); dropping the receiver just discards further events.
    pub fn spawn(&self) -> mpsc::Receiver<HotkeyEvent> {
        let (tx, rx) = mpsc::channel(4);
        let tracker = Arc::new(Mutex::new(KeyTracker::new(self.key_code)));

        std::thread::spawn(move || {
            let callback = move |event: Event| {
                let edge = tracker
                    .lock()
                    .ok()
                    .and_then(|mut t| t.on_event(&event.event_type));
                if let Some(edge) = edge {
                    debug!(?edge, "push-to-talk edge");
                    // Drop rather than block the hook thread if the
                    // consumer is behind.
                    let _ = tx.try_send(edge);
                }
            };

            if let Err(e) = listen(callback) {
                error!("failed to start global key listener: {:?}", e);
            }
        });

        rx
    }
}

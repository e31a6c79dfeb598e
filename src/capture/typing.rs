//! Keystroke capture
//!
//! Records keydown/keyup timing with a coarse key class and counts paste
//! events. Neither key values nor pasted content are ever retained.

use crate::capture::{CapturePhase, InputHub, Subscription};
use crate::types::{round_ms, InputEvent, InputKind, KeyClass, KeyEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Map a host key identifier to its coarse class
pub fn classify_key(code: Option<&str>) -> KeyClass {
    let code = match code {
        Some(code) if !code.is_empty() => code,
        _ => return KeyClass::Unknown,
    };

    if code
        .strip_prefix("Key")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
    {
        return KeyClass::Letter;
    }
    if code.starts_with("Digit") {
        return KeyClass::Digit;
    }
    if code == "Space" {
        return KeyClass::Space;
    }
    if code.contains("Backspace") || code.contains("Delete") {
        return KeyClass::Backspace;
    }
    if code.contains("Enter") {
        return KeyClass::Enter;
    }
    if ["Shift", "Control", "Alt", "Meta"]
        .iter()
        .any(|modifier| code.contains(modifier))
    {
        return KeyClass::Modifier;
    }
    KeyClass::Other
}

/// `code` wins; `key` is only consulted when `code` is missing or empty
fn key_identifier<'a>(code: &'a Option<String>, key: &'a Option<String>) -> Option<&'a str> {
    code.as_deref()
        .filter(|c| !c.is_empty())
        .or(key.as_deref())
}

#[derive(Debug, Default)]
struct TypingBuffer {
    events: Vec<KeyEvent>,
    paste_count: u32,
}

impl TypingBuffer {
    fn record(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown { t, code, key } => {
                let key_class = classify_key(key_identifier(code, key));
                self.events.push(KeyEvent::keydown(round_ms(*t), key_class));
            }
            InputEvent::KeyUp { t, code, key } => {
                let key_class = classify_key(key_identifier(code, key));
                self.events.push(KeyEvent::keyup(round_ms(*t), key_class));
            }
            InputEvent::Paste { .. } => self.paste_count += 1,
            _ => {}
        }
    }
}

/// Single-use keystroke capture for one session
pub struct TypingCapture {
    buffer: Arc<Mutex<TypingBuffer>>,
    subscriptions: Vec<Subscription>,
    phase: CapturePhase,
}

impl Default for TypingCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingCapture {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(TypingBuffer::default())),
            subscriptions: Vec::new(),
            phase: CapturePhase::Idle,
        }
    }

    /// Begin listening on `hub`; no-op unless the capture is idle
    pub fn start(&mut self, hub: &InputHub) {
        match self.phase {
            CapturePhase::Idle => {}
            CapturePhase::Running => return,
            CapturePhase::Stopped => {
                warn!("typing capture already stopped; start a new capture for a new session");
                return;
            }
        }

        let buffer = self.buffer.clone();
        self.subscriptions.push(hub.subscribe(
            &[InputKind::KeyDown, InputKind::KeyUp, InputKind::Paste],
            move |event| buffer.lock().record(event),
        ));
        self.phase = CapturePhase::Running;
        debug!("typing capture started");
    }

    /// Stop listening and return a copy of the recorded events
    pub fn stop(&mut self) -> Vec<KeyEvent> {
        if self.phase == CapturePhase::Running {
            self.subscriptions.clear();
            self.phase = CapturePhase::Stopped;
            let buffer = self.buffer.lock();
            debug!(
                events = buffer.events.len(),
                pastes = buffer.paste_count,
                "typing capture stopped"
            );
        }
        self.events()
    }

    pub fn events(&self) -> Vec<KeyEvent> {
        self.buffer.lock().events.clone()
    }

    pub fn paste_count(&self) -> u32 {
        self.buffer.lock().paste_count
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }
}

//! Core data types
//!
//! Raw input events as delivered by the host, and the sanitized records the
//! capture components keep. Literal key values never leave this module: a
//! [`KeyEvent`] only carries the coarse [`KeyClass`].

use crate::error::CollectError;
use serde::{Deserialize, Serialize};

/// Kind of a raw input event, used to route events to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    KeyDown,
    KeyUp,
    Paste,
    PointerMove,
    PointerDown,
    PointerUp,
    Scroll,
    Focus,
    Blur,
}

/// A raw input event fed into the core by the host environment.
///
/// `t` is the host's monotonic clock in fractional milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    KeyDown {
        t: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    KeyUp {
        t: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    Paste {
        t: f64,
    },
    PointerMove {
        t: f64,
        x: f64,
        y: f64,
    },
    PointerDown {
        t: f64,
        x: f64,
        y: f64,
    },
    PointerUp {
        t: f64,
        x: f64,
        y: f64,
    },
    Scroll {
        t: f64,
    },
    Focus {
        t: f64,
    },
    Blur {
        t: f64,
    },
}

impl InputEvent {
    pub fn kind(&self) -> InputKind {
        match self {
            InputEvent::KeyDown { .. } => InputKind::KeyDown,
            InputEvent::KeyUp { .. } => InputKind::KeyUp,
            InputEvent::Paste { .. } => InputKind::Paste,
            InputEvent::PointerMove { .. } => InputKind::PointerMove,
            InputEvent::PointerDown { .. } => InputKind::PointerDown,
            InputEvent::PointerUp { .. } => InputKind::PointerUp,
            InputEvent::Scroll { .. } => InputKind::Scroll,
            InputEvent::Focus { .. } => InputKind::Focus,
            InputEvent::Blur { .. } => InputKind::Blur,
        }
    }

    /// Host timestamp in milliseconds
    pub fn t(&self) -> f64 {
        match self {
            InputEvent::KeyDown { t, .. }
            | InputEvent::KeyUp { t, .. }
            | InputEvent::Paste { t }
            | InputEvent::PointerMove { t, .. }
            | InputEvent::PointerDown { t, .. }
            | InputEvent::PointerUp { t, .. }
            | InputEvent::Scroll { t }
            | InputEvent::Focus { t }
            | InputEvent::Blur { t } => *t,
        }
    }

    /// Reject events whose timestamp or coordinates are not finite numbers
    pub fn validate(&self) -> Result<(), CollectError> {
        if !self.t().is_finite() {
            return Err(CollectError::InvalidEvent(format!(
                "{:?} event has a non-finite timestamp",
                self.kind()
            )));
        }
        match self {
            InputEvent::PointerMove { x, y, .. }
            | InputEvent::PointerDown { x, y, .. }
            | InputEvent::PointerUp { x, y, .. }
                if !(x.is_finite() && y.is_finite()) =>
            {
                Err(CollectError::InvalidEvent(format!(
                    "{:?} event at t={} has non-finite coordinates",
                    self.kind(),
                    self.t()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Parse a JSON array of input events
    pub fn parse_array(json: &str) -> Result<Vec<InputEvent>, CollectError> {
        let events: Vec<InputEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (one input event per line)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<InputEvent>, CollectError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<InputEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(CollectError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }
}

/// Round a host timestamp to whole milliseconds
pub(crate) fn round_ms(t: f64) -> i64 {
    t.round() as i64
}

/// Coarse key category; the only trace of a keystroke that is retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyClass {
    Letter,
    Digit,
    Space,
    Backspace,
    Enter,
    Modifier,
    Other,
    Unknown,
}

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventType {
    Keydown,
    Keyup,
}

/// Sanitized keystroke record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Monotonic timestamp (ms)
    pub t: i64,
    #[serde(rename = "type")]
    pub event_type: KeyEventType,
    pub key_class: KeyClass,
}

impl KeyEvent {
    pub fn keydown(t: i64, key_class: KeyClass) -> Self {
        Self {
            t,
            event_type: KeyEventType::Keydown,
            key_class,
        }
    }

    pub fn keyup(t: i64, key_class: KeyClass) -> Self {
        Self {
            t,
            event_type: KeyEventType::Keyup,
            key_class,
        }
    }
}

/// Throttled pointer position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSample {
    pub t: i64,
    pub x: i64,
    pub y: i64,
}

/// Pointer button transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickType {
    Down,
    Up,
}

/// Pointer button event, recorded unthrottled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub t: i64,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub click_type: ClickType,
}

/// Window focus transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusKind {
    Focus,
    Blur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusEvent {
    pub t: i64,
    pub event: FocusKind,
}

/// Value copy of the cursor capture buffers taken at stop time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerSnapshot {
    pub samples: Vec<PointerSample>,
    pub clicks: Vec<ClickEvent>,
}

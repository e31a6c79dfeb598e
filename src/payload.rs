//! Outbound payload
//!
//! One JSON object per session: flattened session metadata, opaque
//! environment blobs, consent-gated raw behavior data, derived features and a
//! free-text label.

use crate::features::DerivedFeatures;
use crate::types::{FocusEvent, KeyEvent, PointerSnapshot};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Label used when the caller does not supply one
pub const DEFAULT_LABEL: &str = "unknown";

/// Session metadata provided at session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub task_id: String,
    pub consent: bool,
    /// Epoch milliseconds
    pub timestamp_start: i64,
}

impl SessionMeta {
    /// Start a session with a freshly provisioned UUID v4 session id
    pub fn new(task_id: impl Into<String>, consent: bool) -> Self {
        Self::with_session_id(Uuid::new_v4().to_string(), task_id, consent)
    }

    /// Start a session under a collaborator-provided id
    pub fn with_session_id(
        session_id: impl Into<String>,
        task_id: impl Into<String>,
        consent: bool,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            task_id: task_id.into(),
            consent,
            timestamp_start: Utc::now().timestamp_millis(),
        }
    }
}

/// Environment records owned by collaborators, embedded unmodified
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentBlobs {
    #[serde(default)]
    pub device: Value,
    #[serde(default)]
    pub browser_env: Value,
    #[serde(default)]
    pub network: Value,
}

/// Raw interaction data; event arrays are empty without consent.
///
/// `mouse_samples` keeps its object shape either way: without consent it
/// serializes as `{"samples":[],"clicks":[]}`, never as a bare `[]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorData {
    pub typing_events: Vec<KeyEvent>,
    pub mouse_samples: PointerSnapshot,
    pub focus_events: Vec<FocusEvent>,
    /// Paste count
    pub paste_events: u32,
    /// Scroll count
    pub scroll_events: u32,
}

/// Drained output of both capture components for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCapture {
    pub typing_events: Vec<KeyEvent>,
    pub pointer: PointerSnapshot,
    pub focus_events: Vec<FocusEvent>,
    pub paste_count: u32,
    pub scroll_count: u32,
}

/// The unit delivered to the remote collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(flatten)]
    pub session: SessionMeta,
    /// Epoch milliseconds
    pub timestamp_end: i64,
    pub device: Value,
    pub browser_env: Value,
    pub network: Value,
    pub behavior: BehaviorData,
    pub derived_features: DerivedFeatures,
    pub label: String,
}

impl Payload {
    /// Assemble a payload, dropping raw events unless consent was recorded.
    ///
    /// Counts and derived features are kept either way.
    pub fn assemble(
        session: SessionMeta,
        env: EnvironmentBlobs,
        capture: SessionCapture,
        derived_features: DerivedFeatures,
        label: Option<&str>,
        timestamp_end: i64,
    ) -> Self {
        let behavior = if session.consent {
            BehaviorData {
                typing_events: capture.typing_events,
                mouse_samples: capture.pointer,
                focus_events: capture.focus_events,
                paste_events: capture.paste_count,
                scroll_events: capture.scroll_count,
            }
        } else {
            BehaviorData {
                paste_events: capture.paste_count,
                scroll_events: capture.scroll_count,
                ..BehaviorData::default()
            }
        };

        Self {
            session,
            timestamp_end,
            device: env.device,
            browser_env: env.browser_env,
            network: env.network,
            behavior,
            derived_features,
            label: label.unwrap_or(DEFAULT_LABEL).to_string(),
        }
    }
}

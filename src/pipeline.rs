//! Session orchestration
//!
//! A [`SessionPipeline`] owns everything one session needs: the capture
//! components listening on the host's [`InputHub`], the session metadata, the
//! environment blobs and a handle to the shared [`DeliveryQueue`]. It is built
//! at session start and consumed when the payload is handed off.
//!
//! Pipeline stages:
//! 1. TypingCapture / CursorCapture - Record sanitized interaction events
//! 2. compute_derived_features - Aggregate into DerivedFeatures
//! 3. Payload::assemble - Apply consent gating and attach metadata
//! 4. DeliveryQueue - Persist and deliver

use crate::capture::{CursorCapture, InputHub, TypingCapture};
use crate::config::CaptureConfig;
use crate::delivery::DeliveryQueue;
use crate::error::CollectError;
use crate::features::{compute_derived_features, DerivedFeatures};
use crate::payload::{EnvironmentBlobs, Payload, SessionCapture, SessionMeta};
use crate::types::InputEvent;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Derive features from a drained session capture
pub fn features_from_capture(capture: &SessionCapture) -> DerivedFeatures {
    compute_derived_features(
        &capture.typing_events,
        &capture.pointer,
        &capture.focus_events,
    )
}

/// Run a recorded event trace through fresh captures.
///
/// Events are dispatched in the given order with the same throttling,
/// eviction and classification a live session applies.
///
/// # Example
/// ```ignore
/// let events = InputEvent::parse_ndjson(&trace)?;
/// let capture = replay_session(&events, &CaptureConfig::default())?;
/// let features = features_from_capture(&capture);
/// ```
pub fn replay_session(
    events: &[InputEvent],
    config: &CaptureConfig,
) -> Result<SessionCapture, CollectError> {
    for (index, event) in events.iter().enumerate() {
        event.validate().map_err(|e| match e {
            CollectError::InvalidEvent(msg) => {
                CollectError::InvalidEvent(format!("event {index}: {msg}"))
            }
            other => other,
        })?;
    }

    let hub = InputHub::new();
    let mut typing = TypingCapture::new();
    let mut cursor = CursorCapture::new(config);
    typing.start(&hub);
    cursor.start(&hub);

    for event in events {
        hub.dispatch(event);
    }

    let capture = drain(&mut typing, &mut cursor);
    debug!(
        events = events.len(),
        typing_events = capture.typing_events.len(),
        samples = capture.pointer.samples.len(),
        "replayed session trace"
    );
    Ok(capture)
}

fn drain(typing: &mut TypingCapture, cursor: &mut CursorCapture) -> SessionCapture {
    let typing_events = typing.stop();
    let pointer = cursor.stop();
    SessionCapture {
        typing_events,
        pointer,
        focus_events: cursor.focus_events(),
        paste_count: typing.paste_count(),
        scroll_count: cursor.scroll_count(),
    }
}

/// Context object for one capture session
pub struct SessionPipeline {
    hub: InputHub,
    typing: TypingCapture,
    cursor: CursorCapture,
    session: SessionMeta,
    env: EnvironmentBlobs,
    queue: Arc<DeliveryQueue>,
}

impl SessionPipeline {
    /// Create the captures for a session; they only listen when consent was given
    pub fn begin(
        hub: &InputHub,
        session: SessionMeta,
        env: EnvironmentBlobs,
        config: &CaptureConfig,
        queue: Arc<DeliveryQueue>,
    ) -> Self {
        let mut typing = TypingCapture::new();
        let mut cursor = CursorCapture::new(config);
        if session.consent {
            typing.start(hub);
            cursor.start(hub);
        }
        info!(
            session_id = %session.session_id,
            task_id = %session.task_id,
            consent = session.consent,
            "session started"
        );
        Self {
            hub: hub.clone(),
            typing,
            cursor,
            session,
            env,
            queue,
        }
    }

    pub fn hub(&self) -> &InputHub {
        &self.hub
    }

    pub fn session(&self) -> &SessionMeta {
        &self.session
    }

    /// Stop both captures and assemble the session payload.
    ///
    /// Captures are single-use: gathering again yields the same data.
    pub fn gather(&mut self, label: Option<&str>) -> Payload {
        let capture = drain(&mut self.typing, &mut self.cursor);
        let derived = features_from_capture(&capture);
        Payload::assemble(
            self.session.clone(),
            self.env.clone(),
            capture,
            derived,
            label,
            Utc::now().timestamp_millis(),
        )
    }

    /// Gather the payload and hand it to the delivery queue.
    ///
    /// Resolves once the payload is queued; delivery may still be pending.
    pub async fn gather_and_send(mut self, label: Option<&str>) -> Payload {
        let payload = self.gather(label);
        let outcome = self.queue.send(payload.clone()).await;
        info!(
            session_id = %payload.session.session_id,
            label = %payload.label,
            ?outcome,
            "session payload handed off"
        );
        payload
    }
}

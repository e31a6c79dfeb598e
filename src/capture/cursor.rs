//! Pointer, click, scroll and focus capture
//!
//! Pointer moves are throttled and kept in a bounded ring buffer; long
//! sessions lose their earliest samples. Clicks and focus transitions are
//! recorded unthrottled and without a cap.

use crate::capture::sampler::{BoundedBuffer, Throttle};
use crate::capture::{CapturePhase, InputHub, Subscription};
use crate::config::CaptureConfig;
use crate::types::{
    round_ms, ClickEvent, ClickType, FocusEvent, FocusKind, InputEvent, InputKind, PointerSample,
    PointerSnapshot,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

const CURSOR_EVENT_KINDS: &[InputKind] = &[
    InputKind::PointerMove,
    InputKind::PointerDown,
    InputKind::PointerUp,
    InputKind::Scroll,
    InputKind::Focus,
    InputKind::Blur,
];

#[derive(Debug)]
struct CursorBuffer {
    throttle: Throttle,
    samples: BoundedBuffer<PointerSample>,
    clicks: Vec<ClickEvent>,
    focus_events: Vec<FocusEvent>,
    scroll_count: u32,
}

impl CursorBuffer {
    fn record(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::PointerMove { t, x, y } => {
                if !self.throttle.admit(t) {
                    return;
                }
                self.samples.push(PointerSample {
                    t: round_ms(t),
                    x: x.round() as i64,
                    y: y.round() as i64,
                });
            }
            InputEvent::PointerDown { t, x, y } => self.clicks.push(ClickEvent {
                t: round_ms(t),
                x,
                y,
                click_type: ClickType::Down,
            }),
            InputEvent::PointerUp { t, x, y } => self.clicks.push(ClickEvent {
                t: round_ms(t),
                x,
                y,
                click_type: ClickType::Up,
            }),
            InputEvent::Scroll { .. } => self.scroll_count += 1,
            InputEvent::Focus { t } => self.focus_events.push(FocusEvent {
                t: round_ms(t),
                event: FocusKind::Focus,
            }),
            InputEvent::Blur { t } => self.focus_events.push(FocusEvent {
                t: round_ms(t),
                event: FocusKind::Blur,
            }),
            _ => {}
        }
    }

    fn snapshot(&self) -> PointerSnapshot {
        PointerSnapshot {
            samples: self.samples.snapshot(),
            clicks: self.clicks.clone(),
        }
    }
}

/// Single-use cursor capture for one session
pub struct CursorCapture {
    buffer: Arc<Mutex<CursorBuffer>>,
    subscriptions: Vec<Subscription>,
    phase: CapturePhase,
}

impl Default for CursorCapture {
    fn default() -> Self {
        Self::new(&CaptureConfig::default())
    }
}

impl CursorCapture {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(CursorBuffer {
                throttle: Throttle::new(config.pointer_sample_interval_ms),
                samples: BoundedBuffer::new(config.max_pointer_samples),
                clicks: Vec::new(),
                focus_events: Vec::new(),
                scroll_count: 0,
            })),
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
                warn!("cursor capture already stopped; start a new capture for a new session");
                return;
            }
        }

        let buffer = self.buffer.clone();
        self.subscriptions.push(
            hub.subscribe(CURSOR_EVENT_KINDS, move |event| buffer.lock().record(event)),
        );
        self.phase = CapturePhase::Running;
        debug!("cursor capture started");
    }

    /// Stop listening and return copies of the pointer samples and clicks.
    ///
    /// Focus events and the scroll count are not drained; query them with
    /// [`focus_events`](Self::focus_events) and [`scroll_count`](Self::scroll_count).
    pub fn stop(&mut self) -> PointerSnapshot {
        if self.phase == CapturePhase::Running {
            self.subscriptions.clear();
            self.phase = CapturePhase::Stopped;
            let buffer = self.buffer.lock();
            debug!(
                samples = buffer.samples.len(),
                evicted = buffer.samples.evicted(),
                clicks = buffer.clicks.len(),
                scrolls = buffer.scroll_count,
                "cursor capture stopped"
            );
        }
        self.buffer.lock().snapshot()
    }

    pub fn snapshot(&self) -> PointerSnapshot {
        self.buffer.lock().snapshot()
    }

    pub fn focus_events(&self) -> Vec<FocusEvent> {
        self.buffer.lock().focus_events.clone()
    }

    pub fn scroll_count(&self) -> u32 {
        self.buffer.lock().scroll_count
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }
}

//! Interaction capture
//!
//! The host pushes raw [`InputEvent`]s into an [`InputHub`]. Capture components
//! subscribe to the kinds they need on `start` and release their
//! [`Subscription`]s on `stop`, so no handler outlives the capture cycle.
//!
//! Pipeline: Host events → InputHub → Typing/Cursor capture → Snapshots

pub mod cursor;
pub mod sampler;
pub mod typing;

pub use cursor::CursorCapture;
pub use sampler::{BoundedBuffer, Throttle};
pub use typing::{classify_key, TypingCapture};

use crate::types::{InputEvent, InputKind};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Handler = Box<dyn FnMut(&InputEvent) + Send>;

struct Registration {
    id: u64,
    kinds: Vec<InputKind>,
    handler: Handler,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    registrations: Vec<Registration>,
}

/// Dispatches host input events to the active subscriptions.
///
/// Cloning yields another handle to the same hub. Handlers run in
/// registration order on the dispatching thread and must not call back into
/// the hub.
#[derive(Clone, Default)]
pub struct InputHub {
    inner: Arc<Mutex<HubInner>>,
}

impl InputHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the given event kinds
    pub fn subscribe<F>(&self, kinds: &[InputKind], handler: F) -> Subscription
    where
        F: FnMut(&InputEvent) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.registrations.push(Registration {
            id,
            kinds: kinds.to_vec(),
            handler: Box::new(handler),
        });
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver one event to every subscriber registered for its kind
    pub fn dispatch(&self, event: &InputEvent) {
        let kind = event.kind();
        let mut inner = self.inner.lock();
        for registration in inner.registrations.iter_mut() {
            if registration.kinds.contains(&kind) {
                (registration.handler)(event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().registrations.len()
    }
}

/// Handle to a registered handler; unregisters on `cancel` or drop
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn cancel(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.lock().registrations.retain(|r| r.id != self.id);
        }
    }
}

/// Lifecycle of a single-use capture component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Running,
    Stopped,
}

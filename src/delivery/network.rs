//! Online/offline signal consumed by the delivery queue

use std::sync::Arc;
use tokio::sync::watch;

/// Shared "network currently available" flag.
///
/// The host flips it from its connectivity events; clones observe the same
/// flag. Going online wakes the delivery queue for an immediate attempt.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag; subscribers are only notified on an actual change
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transition_notifies_subscribers() {
        let status = NetworkStatus::new(false);
        let mut rx = status.subscribe();

        status.set_online(false);
        assert!(!rx.has_changed().unwrap());

        status.clone().set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(status.is_online());
    }
}

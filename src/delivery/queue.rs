//! Durable, retrying delivery queue
//!
//! Payloads are appended to a persisted FIFO and delivered head-first, one
//! attempt at a time. The head stays in the queue while its request is in
//! flight and is only removed after a 2xx answer, so the persisted copy never
//! lags behind memory. Failures keep the head in place and a follow-up attempt
//! is scheduled after a fixed delay for as long as the network is online.
//! There is no retry limit and no expiry.

use crate::config::DeliveryConfig;
use crate::delivery::network::NetworkStatus;
use crate::delivery::storage::QueueStorage;
use crate::delivery::transport::Transport;
use crate::error::DeliveryError;
use crate::payload::Payload;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Observable queue activity; failures are reported here instead of to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued { pending: usize },
    Delivered { session_id: String, pending: usize },
    AttemptFailed { session_id: String, reason: String, pending: usize },
    PersistFailed { reason: String },
    RetryScheduled { delay: Duration },
}

/// Result of one flush call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The head payload was accepted by the collector
    Delivered,
    /// The attempt failed; the head stays queued
    Failed,
    /// Another attempt is in flight
    Busy,
    /// The network is reported offline
    Offline,
    /// Nothing is pending
    Empty,
}

struct QueueInner {
    pending: Mutex<VecDeque<Payload>>,
    sending: AtomicBool,
    storage: Arc<dyn QueueStorage>,
    transport: Arc<dyn Transport>,
    network: NetworkStatus,
    config: DeliveryConfig,
    retry_tx: mpsc::UnboundedSender<()>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueInner {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Write the queue to storage; failures are logged and swallowed
    fn persist(&self, pending: &VecDeque<Payload>) {
        let result = serde_json::to_string(pending)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.storage
                    .store(&self.config.storage_key, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(reason) = result {
            warn!(key = %self.config.storage_key, %reason, "failed to persist pending queue");
            self.emit(QueueEvent::PersistFailed { reason });
        }
    }

    fn enqueue(&self, payload: Payload) {
        let pending = {
            let mut queue = self.pending.lock();
            queue.push_back(payload);
            self.persist(&queue);
            queue.len()
        };
        debug!(pending, "payload enqueued");
        self.emit(QueueEvent::Enqueued { pending });
    }

    async fn flush(&self) -> FlushOutcome {
        if !self.network.is_online() {
            debug!("network offline, delivery deferred");
            return FlushOutcome::Offline;
        }
        if self
            .sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushOutcome::Busy;
        }

        let head = self.pending.lock().front().cloned();
        let outcome = match head {
            None => FlushOutcome::Empty,
            Some(payload) => self.deliver_head(&payload).await,
        };

        self.sending.store(false, Ordering::Release);

        let remaining = self.pending.lock().len();
        if remaining > 0 && self.network.is_online() {
            let _ = self.retry_tx.send(());
        }
        outcome
    }

    async fn deliver_head(&self, payload: &Payload) -> FlushOutcome {
        let session_id = payload.session.session_id.clone();
        match self.attempt(payload).await {
            Ok(()) => {
                let pending = {
                    let mut queue = self.pending.lock();
                    queue.pop_front();
                    self.persist(&queue);
                    queue.len()
                };
                info!(%session_id, pending, "payload delivered");
                self.emit(QueueEvent::Delivered {
                    session_id,
                    pending,
                });
                FlushOutcome::Delivered
            }
            Err(e) => {
                let pending = {
                    let queue = self.pending.lock();
                    self.persist(&queue);
                    queue.len()
                };
                warn!(%session_id, error = %e, pending, "delivery attempt failed, payload kept at head");
                self.emit(QueueEvent::AttemptFailed {
                    session_id,
                    reason: e.to_string(),
                    pending,
                });
                FlushOutcome::Failed
            }
        }
    }

    /// One bounded attempt; the timeout guarantees the sending flag is released
    async fn attempt(&self, payload: &Payload) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload).map_err(DeliveryError::Encode)?;
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, self.transport.post_json(body)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }
}

/// Restore the persisted queue; unreadable or corrupt state starts empty
fn load_pending(storage: &dyn QueueStorage, key: &str) -> VecDeque<Payload> {
    let raw = match storage.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return VecDeque::new(),
        Err(e) => {
            warn!(key, error = %e, "failed to read pending queue, starting empty");
            return VecDeque::new();
        }
    };
    match serde_json::from_str::<VecDeque<Payload>>(&raw) {
        Ok(pending) => pending,
        Err(e) => {
            warn!(key, error = %e, "discarding unparseable pending queue");
            VecDeque::new()
        }
    }
}

/// Drives scheduled retries and online transitions until cancelled
async fn retry_worker(
    inner: Arc<QueueInner>,
    cancel: CancellationToken,
    mut retry_rx: mpsc::UnboundedReceiver<()>,
    mut online_rx: watch::Receiver<bool>,
    resume: bool,
) {
    let mut deadline = resume.then(Instant::now);

    loop {
        let wake_at = deadline;
        let timer = async move {
            match wake_at {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(()) = retry_rx.recv() => {
                if deadline.is_none() {
                    let delay = inner.config.retry_delay();
                    deadline = Some(Instant::now() + delay);
                    debug!(?delay, "retry scheduled");
                    inner.emit(QueueEvent::RetryScheduled { delay });
                }
            }
            _ = timer => {
                deadline = None;
                inner.flush().await;
            }
            Ok(()) = online_rx.changed() => {
                let online = *online_rx.borrow_and_update();
                if online {
                    info!("network back online, resuming delivery");
                    inner.flush().await;
                }
            }
        }
    }
    debug!("delivery retry worker stopped");
}

/// Persisted FIFO of payloads awaiting delivery.
///
/// Must be opened inside a tokio runtime; the retry worker is cancelled on
/// [`shutdown`](Self::shutdown) or drop.
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    /// Reload the persisted queue and start the retry worker.
    ///
    /// A non-empty reloaded queue gets an immediate delivery attempt.
    pub fn open(
        config: DeliveryConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn QueueStorage>,
        network: NetworkStatus,
    ) -> Self {
        let pending = load_pending(storage.as_ref(), &config.storage_key);
        let resume = !pending.is_empty();
        if resume {
            info!(pending = pending.len(), "restored pending payloads");
        }

        // Subscribed here so transitions before the worker's first poll are not lost
        let online_rx = network.subscribe();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(QueueInner {
            pending: Mutex::new(pending),
            sending: AtomicBool::new(false),
            storage,
            transport,
            network,
            config,
            retry_tx,
            events,
        });

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(retry_worker(
            inner.clone(),
            cancel.clone(),
            retry_rx,
            online_rx,
            resume,
        ));

        Self {
            inner,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Append `payload`, persist, and drive a delivery attempt if none is in flight.
    ///
    /// Resolves once the payload is queued and any attempt this call drove has
    /// finished; it never fails, and the payload may still be pending.
    pub async fn send(&self, payload: Payload) -> FlushOutcome {
        self.inner.enqueue(payload);
        self.inner.flush().await
    }

    /// Attempt delivery of the head payload now
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    /// Copy of the pending payloads, head first
    pub fn pending(&self) -> Vec<Payload> {
        self.inner.pending.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pending.lock().is_empty()
    }

    pub fn is_sending(&self) -> bool {
        self.inner.sending.load(Ordering::Acquire)
    }

    pub fn network(&self) -> &NetworkStatus {
        &self.inner.network
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Stop the retry worker; an attempt already in flight runs to completion
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "delivery retry worker failed to join");
            }
        }
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::storage::MemoryStorage;
    use crate::features::DerivedFeatures;
    use crate::payload::{EnvironmentBlobs, SessionCapture, SessionMeta};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    const KEY: &str = "suraksha_pending";

    /// Transport answering from a script; `Ok` once the script runs out
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<(), u16>>>,
        delivered: Mutex<Vec<String>>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn failing(times: usize) -> Arc<Self> {
            let transport = Self::default();
            transport
                .script
                .lock()
                .extend(std::iter::repeat(Err(503)).take(times));
            Arc::new(transport)
        }

        fn ok() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().clone()
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, body: Vec<u8>) -> Result<(), DeliveryError> {
            let payload: Payload = serde_json::from_slice(&body).unwrap();
            let id = payload.session.session_id;
            self.attempts.lock().push(id.clone());
            match self.script.lock().pop_front().unwrap_or(Ok(())) {
                Ok(()) => {
                    self.delivered.lock().push(id);
                    Ok(())
                }
                Err(status) => Err(DeliveryError::Status(status)),
            }
        }
    }

    /// Transport that never answers
    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn post_json(&self, _body: Vec<u8>) -> Result<(), DeliveryError> {
            std::future::pending().await
        }
    }

    fn payload(id: &str) -> Payload {
        Payload::assemble(
            SessionMeta::with_session_id(id, "task", true),
            EnvironmentBlobs::default(),
            SessionCapture::default(),
            DerivedFeatures::default(),
            None,
            0,
        )
    }

    fn persisted_ids(storage: &MemoryStorage) -> Vec<String> {
        let raw = storage.get(KEY).expect("queue persisted");
        let pending: Vec<Payload> = serde_json::from_str(&raw).unwrap();
        pending.into_iter().map(|p| p.session.session_id).collect()
    }

    fn open(
        transport: Arc<dyn Transport>,
        storage: &MemoryStorage,
        network: &NetworkStatus,
    ) -> DeliveryQueue {
        DeliveryQueue::open(
            DeliveryConfig::default(),
            transport,
            Arc::new(storage.clone()),
            network.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_empties_persisted_queue() {
        let transport = ScriptedTransport::ok();
        let storage = MemoryStorage::new();
        let queue = open(transport.clone(), &storage, &NetworkStatus::default());

        let outcome = queue.send(payload("p")).await;
        assert_eq!(outcome, FlushOutcome::Delivered);
        assert!(queue.is_empty());
        assert!(persisted_ids(&storage).is_empty());

        // No further attempts once delivered
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.attempts(), vec!["p"]);
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_head_then_retry_removes_it() {
        let transport = ScriptedTransport::failing(1);
        let storage = MemoryStorage::new();
        let queue = open(transport.clone(), &storage, &NetworkStatus::default());

        let outcome = queue.send(payload("p")).await;
        assert_eq!(outcome, FlushOutcome::Failed);
        assert_eq!(persisted_ids(&storage), vec!["p"]);
        assert!(!queue.is_sending());

        assert_eq!(queue.flush().await, FlushOutcome::Delivered);
        assert!(persisted_ids(&storage).is_empty());
        assert_eq!(transport.attempts(), vec!["p", "p"]);
        assert_eq!(transport.delivered(), vec!["p"]);
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_head_is_retried_automatically() {
        let transport = ScriptedTransport::failing(2);
        let storage = MemoryStorage::new();
        let queue = open(transport.clone(), &storage, &NetworkStatus::default());
        let mut events = queue.subscribe();

        queue.send(payload("p")).await;
        assert_eq!(transport.attempts().len(), 1);

        // Two retries at a 1 s cadence: one more failure, then success
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(transport.attempts(), vec!["p", "p", "p"]);
        assert_eq!(transport.delivered(), vec!["p"]);
        assert!(queue.is_empty());
        assert!(persisted_ids(&storage).is_empty());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&QueueEvent::RetryScheduled {
            delay: Duration::from_secs(1)
        }));
        assert!(seen
            .iter()
            .any(|e| matches!(e, QueueEvent::Delivered { pending: 0, .. })));
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_items_join_the_tail() {
        let transport = ScriptedTransport::failing(1);
        let storage = MemoryStorage::new();
        let queue = open(transport.clone(), &storage, &NetworkStatus::default());

        queue.send(payload("first")).await;
        // Enqueue only: the worker's pending retry owns the next attempt
        queue.inner.enqueue(payload("second"));
        assert_eq!(persisted_ids(&storage), vec!["first", "second"]);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(transport.delivered(), vec!["first", "second"]);
        assert!(persisted_ids(&storage).is_empty());
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_in_flight() {
        let storage = MemoryStorage::new();
        let config = DeliveryConfig {
            request_timeout_ms: 10_000,
            ..DeliveryConfig::default()
        };
        let queue = Arc::new(DeliveryQueue::open(
            config,
            Arc::new(StalledTransport),
            Arc::new(storage.clone()),
            NetworkStatus::default(),
        ));

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.send(payload("a")).await }
        });
        tokio::task::yield_now().await;
        assert!(queue.is_sending());

        // A concurrent send enqueues but cannot start a second attempt
        assert_eq!(queue.send(payload("b")).await, FlushOutcome::Busy);
        assert_eq!(persisted_ids(&storage), vec!["a", "b"]);

        // The bounded wait releases the flag
        assert_eq!(first.await.unwrap(), FlushOutcome::Failed);
        assert!(!queue.is_sending());
        assert_eq!(queue.len(), 2);
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_resumes_in_original_order() {
        let storage = MemoryStorage::new();
        let pending = vec![payload("one"), payload("two")];
        storage.insert(KEY, serde_json::to_string(&pending).unwrap());

        let transport = ScriptedTransport::ok();
        let queue = open(transport.clone(), &storage, &NetworkStatus::default());
        assert_eq!(queue.len(), 2);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(transport.delivered(), vec!["one", "two"]);
        assert!(persisted_ids(&storage).is_empty());
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_survives_queue_restart() {
        let storage = MemoryStorage::new();
        let network = NetworkStatus::new(false);

        let first = open(ScriptedTransport::ok(), &storage, &network);
        assert_eq!(first.send(payload("a")).await, FlushOutcome::Offline);
        assert_eq!(first.send(payload("b")).await, FlushOutcome::Offline);
        first.shutdown().await;
        drop(first);

        let transport = ScriptedTransport::ok();
        let second = open(transport.clone(), &storage, &network);
        assert_eq!(
            second
                .pending()
                .iter()
                .map(|p| p.session.session_id.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        network.set_online(true);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(transport.delivered(), vec!["a", "b"]);
        second.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_defers_until_online_transition() {
        let transport = ScriptedTransport::ok();
        let storage = MemoryStorage::new();
        let network = NetworkStatus::new(false);
        let queue = open(transport.clone(), &storage, &network);

        assert_eq!(queue.send(payload("p")).await, FlushOutcome::Offline);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(transport.attempts().is_empty());
        assert_eq!(persisted_ids(&storage), vec!["p"]);

        network.set_online(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.delivered(), vec!["p"]);
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_before_worker_first_runs() {
        let transport = ScriptedTransport::ok();
        let storage = MemoryStorage::new();
        let network = NetworkStatus::new(false);
        let queue = open(transport.clone(), &storage, &network);

        // No yield between open, send and the transition
        assert_eq!(queue.send(payload("p")).await, FlushOutcome::Offline);
        network.set_online(true);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.delivered(), vec!["p"]);
        assert!(queue.is_empty());
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_keeps_memory_queue() {
        let transport = ScriptedTransport::failing(1);
        let storage = MemoryStorage::with_quota(16);
        let queue = open(transport.clone(), &storage, &NetworkStatus::default());
        let mut events = queue.subscribe();

        assert_eq!(queue.send(payload("p")).await, FlushOutcome::Failed);
        assert_eq!(queue.len(), 1);
        assert!(storage.get(KEY).is_none());
        assert!(matches!(
            events.try_recv(),
            Ok(QueueEvent::PersistFailed { .. })
        ));

        assert_eq!(queue.flush().await, FlushOutcome::Delivered);
        assert!(queue.is_empty());
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_storage_starts_empty() {
        let storage = MemoryStorage::new();
        storage.insert(KEY, "{not json");
        let queue = open(ScriptedTransport::ok(), &storage, &NetworkStatus::default());
        assert!(queue.is_empty());
        assert_eq!(queue.flush().await, FlushOutcome::Empty);
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_scheduled_retries() {
        let transport = ScriptedTransport::failing(1);
        let storage = MemoryStorage::new();
        let queue = open(transport.clone(), &storage, &NetworkStatus::default());

        queue.send(payload("p")).await;
        queue.shutdown().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.attempts().len(), 1);
        assert_eq!(persisted_ids(&storage), vec!["p"]);
    }
}

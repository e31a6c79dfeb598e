//! Payload delivery
//!
//! Completed payloads go into a persisted FIFO and are POSTed head-first to
//! the collector, at most one request at a time. Failures never reach the
//! caller; they are logged, reported on the queue's event channel and retried.
//!
//! Pipeline: Payload → DeliveryQueue → QueueStorage + Transport

pub mod network;
pub mod queue;
pub mod storage;
pub mod transport;

pub use network::NetworkStatus;
pub use queue::{DeliveryQueue, FlushOutcome, QueueEvent};
pub use storage::{FileStorage, MemoryStorage, QueueStorage};
pub use transport::{HttpTransport, Transport};

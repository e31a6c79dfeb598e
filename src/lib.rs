//! Suraksha - Behavioral signal collector
//!
//! Suraksha records how a user interacts during a session, reduces it to a
//! small set of statistics and ships the result to a remote collector:
//! input capture → feature derivation → consent-gated payload → durable delivery.
//!
//! ## Modules
//!
//! - **Capture**: Typing and cursor capture behind an explicit subscription hub
//! - **Features**: Pure aggregation of captured events into DerivedFeatures
//! - **Delivery**: Persisted FIFO with serialized, retrying HTTP delivery

pub mod capture;
pub mod config;
pub mod delivery;
pub mod error;
pub mod features;
pub mod payload;
pub mod pipeline;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use capture::{CursorCapture, InputHub, Subscription, TypingCapture};
pub use config::{CaptureConfig, Config, DeliveryConfig};
pub use error::{CollectError, DeliveryError, StorageError};
pub use features::{compute_derived_features, DerivedFeatures};
pub use payload::{EnvironmentBlobs, Payload, SessionCapture, SessionMeta};
pub use pipeline::{features_from_capture, replay_session, SessionPipeline};

// Delivery exports
pub use delivery::{
    DeliveryQueue, FileStorage, FlushOutcome, HttpTransport, MemoryStorage, NetworkStatus,
    QueueEvent, QueueStorage, Transport,
};

/// Library version
pub const SURAKSHA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "suraksha";

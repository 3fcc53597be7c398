//! # Hooksmith Core
//!
//! Outbound webhook delivery engine: a data model of endpoints, events,
//! and deliveries; event fan-out; HMAC request signing; a bounded
//! exponential-backoff retry state machine; and a small library of
//! inbound signature verifiers for webhooks arriving from third parties.
//!
//! Persistence (`Store`) and scheduling (`Scheduler`) are pluggable
//! traits — the in-memory implementations shipped here are sufficient
//! for a single process; a durable backend is a drop-in replacement.

mod config;
mod delivery;
mod dispatcher;
mod endpoint;
#[cfg(feature = "http-client")]
mod engine;
mod error;
mod retry;
mod scheduler;
mod signer;
mod stats;
mod store;
mod verifier;
#[cfg(feature = "http-client")]
mod worker;

pub use config::EngineConfig;
#[cfg(feature = "toml-config")]
pub use config::ConfigError;
pub use delivery::{Delivery, DeliveryResponse, DeliveryStatus, MAX_RESPONSE_BODY_BYTES};
pub use dispatcher::Dispatcher;
pub use endpoint::{Endpoint, SECRET_PREFIX};
#[cfg(feature = "http-client")]
pub use engine::WebhookEngine;
pub use error::{EngineError, EngineResult};
pub use retry::RetryConfig;
pub use scheduler::{InMemoryScheduler, Scheduler, WorkerCallback};
pub use signer::{constant_time_eq, Signer, DEFAULT_TOLERANCE_SECS};
pub use stats::{EndpointStats, Stats};
pub use store::{InMemoryStore, Store};
pub use verifier::{verify_scheme_g, verify_scheme_l, verify_scheme_s, verify_v1};
#[cfg(feature = "http-client")]
pub use worker::Worker;

pub use hooksmith_events::Event;

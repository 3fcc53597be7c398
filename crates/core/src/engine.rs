//! Lifecycle-scoped delivery engine façade (§9 design note).
//!
//! Rather than a process-wide singleton, the engine is a constructed
//! service with explicit `start`/`stop`. Some caller has to expose
//! `retryDelivery`, endpoint CRUD, and `Stats::for_endpoint` even though
//! the HTTP admin surface itself is out of scope — this is that caller.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::delivery::Delivery;
use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::error::{EngineError, EngineResult};
use crate::scheduler::{InMemoryScheduler, Scheduler};
use crate::stats::{EndpointStats, Stats};
use crate::store::{InMemoryStore, Store};
use crate::worker::Worker;

pub struct WebhookEngine {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    dispatcher: Dispatcher,
    stats: Stats,
    accepting: AtomicBool,
}

impl WebhookEngine {
    /// Wires the Store, Scheduler, and Attempt Worker together and
    /// starts accepting dispatches. The Scheduler needs a callback into
    /// the Worker before the Worker exists and the Worker needs the
    /// Scheduler to reschedule retries, so the callback closes over a
    /// `OnceLock` the Worker is dropped into immediately after.
    #[cfg(feature = "http-client")]
    pub fn start(config: EngineConfig) -> Self {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());

        let worker_cell: Arc<OnceLock<Worker>> = Arc::new(OnceLock::new());
        let callback_cell = worker_cell.clone();
        let callback = Arc::new(move |delivery_id: String| {
            let cell = callback_cell.clone();
            Box::pin(async move {
                if let Some(worker) = cell.get() {
                    worker.run(delivery_id).await;
                }
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        });

        let scheduler: Arc<dyn Scheduler> = Arc::new(InMemoryScheduler::new(
            callback,
            config.worker_concurrency,
            config.max_queue_depth,
        ));

        let worker = Worker::new(store.clone(), scheduler.clone(), config.clone());
        worker_cell
            .set(worker)
            .unwrap_or_else(|_| unreachable!("worker cell is set exactly once, here"));

        let dispatcher = Dispatcher::new(store.clone(), scheduler.clone());
        let stats = Stats::new(store.clone());

        tracing::info!("webhook engine started");
        Self {
            store,
            scheduler,
            dispatcher,
            stats,
            accepting: AtomicBool::new(true),
        }
    }

    /// Stops accepting new dispatches and waits up to `deadline` for
    /// in-flight attempts to finish voluntarily.
    pub async fn stop(&self, deadline: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        tracing::info!("webhook engine stopping, draining in-flight attempts");
        tokio::time::sleep(deadline).await;
        tracing::info!(remaining_depth = self.scheduler.queue_depth(), "webhook engine stopped");
    }

    pub async fn register_endpoint(&self, endpoint: Endpoint) -> EngineResult<()> {
        self.store.create_endpoint(endpoint).await
    }

    pub async fn unregister_endpoint(&self, endpoint_id: &str) -> EngineResult<()> {
        self.store.delete_endpoint(endpoint_id).await
    }

    /// Generates a fresh secret for an endpoint and persists it
    /// atomically. Returns the new secret — the only time, besides
    /// creation, that it is ever handed back to a caller.
    pub async fn rotate_secret(&self, endpoint_id: &str) -> EngineResult<String> {
        let mut endpoint = self
            .store
            .get_endpoint(endpoint_id)
            .await?
            .ok_or_else(|| EngineError::EndpointNotFound(endpoint_id.to_string()))?;
        let secret = endpoint.rotate_secret().to_string();
        self.store.update_endpoint(endpoint).await?;
        tracing::info!(endpoint_id, "secret rotated");
        Ok(secret)
    }

    pub async fn dispatch(&self, event_type: impl Into<String>, data: Value) -> EngineResult<Vec<Delivery>> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::Internal("engine is stopped".to_string()));
        }
        self.dispatcher.dispatch(event_type, data).await
    }

    pub async fn stats_for_endpoint(&self, endpoint_id: &str) -> EngineResult<EndpointStats> {
        self.stats.for_endpoint(endpoint_id).await
    }

    /// Operator retry (§4.E): resets a non-delivered delivery to
    /// `pending` and re-enqueues it immediately. No-op on an already
    /// `delivered` delivery.
    pub async fn retry_delivery(&self, delivery_id: &str) -> EngineResult<bool> {
        let mut delivery = self
            .store
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| EngineError::DeliveryNotFound(delivery_id.to_string()))?;

        if !delivery.operator_retry() {
            return Ok(false);
        }

        self.store.update_delivery(delivery).await?;
        self.scheduler.enqueue(delivery_id.to_string()).await?;
        Ok(true)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

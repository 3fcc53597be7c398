//! Push-based scheduling of delivery attempts (§4.C Scheduler interface).

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};

use crate::error::{EngineError, EngineResult};

type WorkerInvocation = Pin<Box<dyn Future<Output = ()> + Send>>;
/// The callback the Scheduler invokes for a ready delivery id — in
/// practice `Worker::run` wrapped in a closure.
pub type WorkerCallback = Arc<dyn Fn(String) -> WorkerInvocation + Send + Sync>;

type GuardTable = Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>;

/// Arranges for a delivery id to be handed to the Attempt Worker, now or
/// after a delay, never twice concurrently for the same id.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Arrange for the worker to run `delivery_id` as soon as a slot is
    /// free. Rejected with `Overloaded` if the queue is at capacity —
    /// callers (the Dispatcher) must check this *before* persisting the
    /// Delivery record it would otherwise orphan.
    async fn enqueue(&self, delivery_id: String) -> EngineResult<()>;

    /// Same as `enqueue`, but the worker is not invoked before `delay`
    /// elapses.
    async fn enqueue_after(&self, delivery_id: String, delay: Duration) -> EngineResult<()>;

    /// Current in-flight-plus-queued depth, for backpressure decisions.
    fn queue_depth(&self) -> usize;
}

/// `tokio`-task-per-delay scheduler. Per-delivery-id exclusion is
/// enforced with a guard map of per-id mutexes; total concurrency is
/// bounded by a semaphore sized to `workerConcurrency`.
pub struct InMemoryScheduler {
    callback: WorkerCallback,
    guards: GuardTable,
    concurrency: Arc<Semaphore>,
    depth: Arc<AtomicUsize>,
    max_queue_depth: usize,
}

impl InMemoryScheduler {
    /// `worker_concurrency` bounds simultaneous in-flight attempts;
    /// `max_queue_depth` bounds the combined queued-plus-in-flight count
    /// before `enqueue` starts rejecting with `Overloaded`.
    pub fn new(callback: WorkerCallback, worker_concurrency: usize, max_queue_depth: usize) -> Self {
        Self {
            callback,
            guards: Arc::new(RwLock::new(HashMap::new())),
            concurrency: Arc::new(Semaphore::new(worker_concurrency)),
            depth: Arc::new(AtomicUsize::new(0)),
            max_queue_depth,
        }
    }

    fn reserve(&self) -> EngineResult<()> {
        loop {
            let current = self.depth.load(Ordering::SeqCst);
            if current >= self.max_queue_depth {
                return Err(EngineError::Overloaded);
            }
            if self
                .depth
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    fn spawn_invocation(&self, delivery_id: String, delay: Option<Duration>) {
        let callback = self.callback.clone();
        let concurrency = self.concurrency.clone();
        let depth = self.depth.clone();
        let guards = self.guards.clone();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let guard = {
                let mut table = guards.write().await;
                table
                    .entry(delivery_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            };
            {
                let _id_lock = guard.lock().await;
                let _permit = concurrency.acquire().await;
                callback(delivery_id.clone()).await;
            }
            drop(guard);
            // Drop the table entry once nothing else holds it, so the map
            // doesn't grow by one for every delivery id ever scheduled.
            {
                let mut table = guards.write().await;
                if let Some(entry) = table.get(&delivery_id) {
                    if Arc::strong_count(entry) == 1 {
                        table.remove(&delivery_id);
                    }
                }
            }
            depth.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    async fn enqueue(&self, delivery_id: String) -> EngineResult<()> {
        self.reserve()?;
        self.spawn_invocation(delivery_id, None);
        Ok(())
    }

    async fn enqueue_after(&self, delivery_id: String, delay: Duration) -> EngineResult<()> {
        self.reserve()?;
        self.spawn_invocation(delivery_id, Some(delay));
        Ok(())
    }

    fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

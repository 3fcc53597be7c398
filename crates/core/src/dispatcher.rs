//! Event fan-out: matching endpoints to newly created deliveries (§4.D).

use serde_json::Value;
use std::sync::Arc;

use hooksmith_events::Event;

use crate::delivery::Delivery;
use crate::error::EngineResult;
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Fans an event out to every active, matching endpoint.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { store, scheduler }
    }

    /// 1. Builds the Event. 2. Snapshots endpoints, keeps active matches.
    /// 3. Creates and enqueues one Delivery per match, atomically per
    /// endpoint: a failed enqueue rolls back its own Delivery and aborts
    /// the rest of the fan-out rather than leaving a partial, silently
    /// truncated set. 4. Returns everything created before that point.
    ///
    /// An empty match set returns an empty list, never an error.
    pub async fn dispatch(&self, event_type: impl Into<String>, data: Value) -> EngineResult<Vec<Delivery>> {
        let event = Event::new(event_type, data);
        let endpoints = self.store.list_endpoints().await?;

        let mut created = Vec::new();
        for endpoint in endpoints.into_iter().filter(|e| e.matches(&event.event_type)) {
            let delivery = Delivery::new(endpoint.id.clone(), event.clone());
            self.store.create_delivery(delivery.clone()).await?;

            match self.scheduler.enqueue(delivery.id.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        delivery_id = %delivery.id,
                        endpoint_id = %endpoint.id,
                        "dispatched delivery"
                    );
                    created.push(delivery);
                }
                Err(err) => {
                    self.store.delete_delivery(&delivery.id).await?;
                    tracing::warn!(endpoint_id = %endpoint.id, "dispatch rejected: scheduler overloaded");
                    return Err(err);
                }
            }
        }

        Ok(created)
    }
}

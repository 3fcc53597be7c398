//! Pluggable persistence for endpoints and deliveries (§4.B Store).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::delivery::{Delivery, DeliveryStatus};
use crate::endpoint::Endpoint;
use crate::error::{EngineError, EngineResult};

/// Two keyed tables — `endpoints[id]` and `deliveries[id]` — with atomic
/// single-entity operations and one snapshot-style list query.
///
/// Snapshots returned to callers are defensive copies: mutating the
/// returned value never affects stored state. Internal mutation is the
/// exclusive business of the Dispatcher (endpoint creates) and the
/// Attempt Worker (delivery updates); nothing else should call the
/// `update_*`/`delete_*` methods directly.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_endpoint(&self, endpoint: Endpoint) -> EngineResult<()>;
    async fn get_endpoint(&self, id: &str) -> EngineResult<Option<Endpoint>>;
    async fn list_endpoints(&self) -> EngineResult<Vec<Endpoint>>;
    async fn update_endpoint(&self, endpoint: Endpoint) -> EngineResult<()>;
    async fn delete_endpoint(&self, id: &str) -> EngineResult<()>;

    async fn create_delivery(&self, delivery: Delivery) -> EngineResult<()>;
    async fn get_delivery(&self, id: &str) -> EngineResult<Option<Delivery>>;
    async fn update_delivery(&self, delivery: Delivery) -> EngineResult<()>;
    /// Rolls back a delivery that was created but could not be
    /// atomically paired with a successful Scheduler enqueue.
    async fn delete_delivery(&self, id: &str) -> EngineResult<()>;

    /// Lists deliveries for `endpoint_id`, newest first, optionally
    /// filtered to one status, then offset and limited in that order.
    async fn list_deliveries(
        &self,
        endpoint_id: &str,
        status: Option<DeliveryStatus>,
        offset: usize,
        limit: usize,
    ) -> EngineResult<Vec<Delivery>>;

    /// All deliveries for `endpoint_id`, unpaginated — used by `Stats`,
    /// which needs the full set rather than a page of it.
    async fn all_deliveries_for_endpoint(&self, endpoint_id: &str) -> EngineResult<Vec<Delivery>>;
}

/// In-memory `Store`. The only implementation shipped here; durable
/// backends are a drop-in replacement behind the same trait.
#[derive(Default)]
pub struct InMemoryStore {
    endpoints: RwLock<HashMap<String, Endpoint>>,
    deliveries: RwLock<HashMap<String, Delivery>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_endpoint(&self, endpoint: Endpoint) -> EngineResult<()> {
        let mut endpoints = self.endpoints.write().await;
        endpoints.insert(endpoint.id.clone(), endpoint);
        Ok(())
    }

    async fn get_endpoint(&self, id: &str) -> EngineResult<Option<Endpoint>> {
        let endpoints = self.endpoints.read().await;
        Ok(endpoints.get(id).cloned())
    }

    async fn list_endpoints(&self) -> EngineResult<Vec<Endpoint>> {
        let endpoints = self.endpoints.read().await;
        Ok(endpoints.values().cloned().collect())
    }

    async fn update_endpoint(&self, endpoint: Endpoint) -> EngineResult<()> {
        let mut endpoints = self.endpoints.write().await;
        if !endpoints.contains_key(&endpoint.id) {
            return Err(EngineError::EndpointNotFound(endpoint.id));
        }
        endpoints.insert(endpoint.id.clone(), endpoint);
        Ok(())
    }

    async fn delete_endpoint(&self, id: &str) -> EngineResult<()> {
        let mut endpoints = self.endpoints.write().await;
        endpoints.remove(id);
        Ok(())
    }

    async fn create_delivery(&self, delivery: Delivery) -> EngineResult<()> {
        let mut deliveries = self.deliveries.write().await;
        deliveries.insert(delivery.id.clone(), delivery);
        Ok(())
    }

    async fn get_delivery(&self, id: &str) -> EngineResult<Option<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries.get(id).cloned())
    }

    async fn update_delivery(&self, delivery: Delivery) -> EngineResult<()> {
        let mut deliveries = self.deliveries.write().await;
        if !deliveries.contains_key(&delivery.id) {
            return Err(EngineError::DeliveryNotFound(delivery.id));
        }
        deliveries.insert(delivery.id.clone(), delivery);
        Ok(())
    }

    async fn delete_delivery(&self, id: &str) -> EngineResult<()> {
        let mut deliveries = self.deliveries.write().await;
        deliveries.remove(id);
        Ok(())
    }

    async fn list_deliveries(
        &self,
        endpoint_id: &str,
        status: Option<DeliveryStatus>,
        offset: usize,
        limit: usize,
    ) -> EngineResult<Vec<Delivery>> {
        let deliveries = self.deliveries.read().await;
        let mut matching: Vec<Delivery> = deliveries
            .values()
            .filter(|d| d.endpoint_id == endpoint_id)
            .filter(|d| status.map(|s| d.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn all_deliveries_for_endpoint(&self, endpoint_id: &str) -> EngineResult<Vec<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries
            .values()
            .filter(|d| d.endpoint_id == endpoint_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Delivery;
    use hooksmith_events::Event;

    fn sample_endpoint() -> Endpoint {
        Endpoint::new("https://sink.example/").with_all_events()
    }

    #[tokio::test]
    async fn create_then_get_endpoint_round_trips() {
        let store = InMemoryStore::new();
        let endpoint = sample_endpoint();
        let id = endpoint.id.clone();
        store.create_endpoint(endpoint).await.unwrap();
        let fetched = store.get_endpoint(&id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn update_unknown_endpoint_errors() {
        let store = InMemoryStore::new();
        let err = store.update_endpoint(sample_endpoint()).await.unwrap_err();
        assert!(matches!(err, EngineError::EndpointNotFound(_)));
    }

    #[tokio::test]
    async fn list_deliveries_orders_newest_first_and_paginates() {
        let store = InMemoryStore::new();
        let endpoint_id = "ep-1";
        for i in 0..5 {
            let mut d = Delivery::new(
                endpoint_id,
                Event::new("user.created", serde_json::json!({ "i": i })),
            );
            d.created_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            store.create_delivery(d).await.unwrap();
        }

        let page = store
            .list_deliveries(endpoint_id, None, 0, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at > page[1].created_at);

        let rest = store
            .list_deliveries(endpoint_id, None, 2, 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
    }

    #[tokio::test]
    async fn list_deliveries_filters_by_status() {
        let store = InMemoryStore::new();
        let mut delivered = Delivery::new(
            "ep-1",
            Event::new("user.created", serde_json::json!({})),
        );
        delivered.status = DeliveryStatus::Delivered;
        store.create_delivery(delivered).await.unwrap();
        store
            .create_delivery(Delivery::new(
                "ep-1",
                Event::new("user.created", serde_json::json!({})),
            ))
            .await
            .unwrap();

        let only_delivered = store
            .list_deliveries("ep-1", Some(DeliveryStatus::Delivered), 0, 10)
            .await
            .unwrap();
        assert_eq!(only_delivered.len(), 1);
    }
}

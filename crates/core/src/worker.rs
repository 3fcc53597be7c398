//! Executes one HTTP attempt for one delivery (§4.E Attempt Worker).

use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::delivery::{truncate_response_body, Delivery, DeliveryResponse, DeliveryStatus};
use crate::endpoint::Endpoint;
use crate::error::EngineError;
use crate::scheduler::Scheduler;
use crate::signer::Signer;
use crate::store::Store;

/// The heart of the system: loads a delivery and its endpoint, attempts
/// one signed HTTP POST, and either finishes the delivery or reschedules
/// it through the Scheduler, per the state machine in §4.E.
pub struct Worker {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    config: EngineConfig,
    #[cfg(feature = "http-client")]
    client: reqwest::Client,
}

impl Worker {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<dyn Scheduler>, config: EngineConfig) -> Self {
        #[cfg(feature = "http-client")]
        let client = {
            let mut builder = reqwest::Client::builder();
            if !config.redirects_allowed {
                builder = builder.redirect(reqwest::redirect::Policy::none());
            }
            builder.build().expect("reqwest client configuration is valid")
        };

        Self {
            store,
            scheduler,
            config,
            #[cfg(feature = "http-client")]
            client,
        }
    }

    /// Runs one attempt for `delivery_id`. Never propagates an error to
    /// the caller — every failure is folded into the Delivery record or
    /// logged and dropped, per §4.E's "no silent failure, but no
    /// exception either" contract.
    #[cfg(feature = "http-client")]
    pub async fn run(&self, delivery_id: String) {
        let delivery = match self.store.get_delivery(&delivery_id).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                tracing::debug!(delivery_id = %delivery_id, "delivery missing, dropping");
                return;
            }
            Err(err) => {
                tracing::error!(delivery_id = %delivery_id, error = %err, "store error loading delivery");
                return;
            }
        };

        if delivery.is_terminal() {
            tracing::debug!(delivery_id = %delivery_id, "delivery already terminal, dropping");
            return;
        }

        if let Err(err) = self.attempt(delivery).await {
            tracing::error!(delivery_id = %delivery_id, error = %err, "attempt bookkeeping failed");
        }
    }

    #[cfg(feature = "http-client")]
    async fn attempt(&self, mut delivery: Delivery) -> Result<(), EngineError> {
        let endpoint = self.store.get_endpoint(&delivery.endpoint_id).await?;
        let endpoint = match endpoint {
            Some(e) if e.active => e,
            _ => {
                delivery.mark_failed(EngineError::EndpointGone.to_string(), None, None);
                self.store.update_delivery(delivery).await?;
                return Ok(());
            }
        };

        let body = match self.serialize_body(&delivery) {
            Ok(body) => body,
            Err(err) => return Err(err),
        };

        if body.len() > self.config.max_payload_size {
            delivery.mark_failed(EngineError::PayloadTooLarge.to_string(), None, None);
            self.store.update_delivery(delivery).await?;
            return Ok(());
        }

        let timestamp = chrono::Utc::now().timestamp();
        let signer = Signer::new(endpoint.secret.clone());
        let signature = signer.sign(timestamp, &body);
        let headers = self.build_headers(&endpoint, &delivery.id, &signature, timestamp);

        delivery.begin_attempt();
        self.store.update_delivery(delivery.clone()).await?;

        let retry_config = endpoint
            .retry_config
            .unwrap_or(self.config.default_retry_config);

        let start = Instant::now();
        let outcome = self.send(&endpoint.url, headers, body).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok((status, response_headers, response_body)) => {
                self.classify_and_record(&mut delivery, &retry_config, status, response_headers, response_body, duration_ms)
                    .await?
            }
            Err(err) => {
                self.record_transport_error(&mut delivery, &retry_config, err, duration_ms)
                    .await?
            }
        }

        Ok(())
    }

    fn serialize_body(&self, delivery: &Delivery) -> Result<Vec<u8>, EngineError> {
        let payload = serde_json::json!({
            "id": delivery.event.id,
            "type": delivery.event.event_type,
            "data": delivery.event.data,
            "timestamp": delivery.event.timestamp.to_rfc3339(),
        });
        serde_json::to_vec(&payload).map_err(EngineError::from)
    }

    /// Reserved headers win; any endpoint-supplied header sharing one of
    /// their names is silently dropped.
    fn build_headers(
        &self,
        endpoint: &Endpoint,
        delivery_id: &str,
        signature: &str,
        timestamp: i64,
    ) -> Vec<(String, String)> {
        let reserved = [
            "content-type".to_string(),
            self.config.signature_header.to_lowercase(),
            self.config.timestamp_header.to_lowercase(),
            self.config.delivery_id_header.to_lowercase(),
        ];

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (self.config.signature_header.clone(), signature.to_string()),
            (self.config.timestamp_header.clone(), timestamp.to_string()),
            (self.config.delivery_id_header.clone(), delivery_id.to_string()),
            ("User-Agent".to_string(), "Webhook-Service/1.0".to_string()),
        ];

        for (key, value) in &endpoint.headers {
            if !reserved.contains(&key.to_lowercase()) {
                headers.push((key.clone(), value.clone()));
            }
        }

        headers
    }

    #[cfg(feature = "http-client")]
    async fn send(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Result<(u16, std::collections::HashMap<String, String>, String), EngineError> {
        let mut request = self.client.post(url).timeout(self.config.timeout).body(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(EngineError::from)?;
        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.text().await.unwrap_or_default();
        Ok((status, response_headers, body))
    }

    async fn classify_and_record(
        &self,
        delivery: &mut Delivery,
        retry_config: &crate::retry::RetryConfig,
        status: u16,
        response_headers: std::collections::HashMap<String, String>,
        response_body: String,
        duration_ms: u64,
    ) -> Result<(), EngineError> {
        let response = DeliveryResponse {
            status_code: status,
            body: truncate_response_body(&response_body),
            headers: response_headers,
        };

        match status {
            200..=299 => {
                delivery.mark_delivered(response, duration_ms);
                tracing::debug!(delivery_id = %delivery.id, status, "delivery succeeded");
            }
            300..=399 => {
                let location = response
                    .headers
                    .get("location")
                    .cloned()
                    .unwrap_or_default();
                delivery.mark_failed(
                    EngineError::UnexpectedRedirect(location).to_string(),
                    Some(response),
                    Some(duration_ms),
                );
                tracing::warn!(delivery_id = %delivery.id, status, "unexpected redirect, terminal");
            }
            408 | 429 => {
                self.reschedule_or_fail(delivery, retry_config, format!("HTTP {status}"), Some(response), duration_ms);
            }
            400..=499 => {
                delivery.mark_failed(EngineError::HttpClientError(status).to_string(), Some(response), Some(duration_ms));
                tracing::warn!(delivery_id = %delivery.id, status, "non-retryable client error");
            }
            500..=599 => {
                self.reschedule_or_fail(delivery, retry_config, format!("HTTP {status}"), Some(response), duration_ms);
            }
            _ => {
                delivery.mark_failed(format!("unexpected status {status}"), Some(response), Some(duration_ms));
            }
        }

        self.store.update_delivery(delivery.clone()).await
    }

    async fn record_transport_error(
        &self,
        delivery: &mut Delivery,
        retry_config: &crate::retry::RetryConfig,
        error: EngineError,
        duration_ms: u64,
    ) -> Result<(), EngineError> {
        tracing::warn!(delivery_id = %delivery.id, error = %error, "transport error on attempt");
        self.reschedule_or_fail(delivery, retry_config, error.to_string(), None, duration_ms);
        self.store.update_delivery(delivery.clone()).await
    }

    fn reschedule_or_fail(
        &self,
        delivery: &mut Delivery,
        retry_config: &crate::retry::RetryConfig,
        error: String,
        response: Option<DeliveryResponse>,
        duration_ms: u64,
    ) {
        let delay = delivery.schedule_retry_or_fail(retry_config, error, response, Some(duration_ms));
        if let Some(delay) = delay {
            let scheduler = self.scheduler.clone();
            let store = self.store.clone();
            let delivery_id = delivery.id.clone();
            tokio::spawn(async move {
                if let Err(err) = scheduler.enqueue_after(delivery_id.clone(), delay).await {
                    tracing::error!(delivery_id = %delivery_id, error = %err, "failed to reschedule retry, failing delivery");
                    if let Ok(Some(mut delivery)) = store.get_delivery(&delivery_id).await {
                        delivery.mark_failed(format!("could not reschedule retry: {err}"), None, None);
                        let _ = store.update_delivery(delivery).await;
                    }
                }
            });
        } else {
            tracing::error!(delivery_id = %delivery.id, "retry budget exhausted, delivery failed");
        }
    }

    /// Operator retry (§4.E): resets a non-delivered delivery to
    /// `pending` and re-enqueues immediately. No-op on an already
    /// `delivered` delivery.
    pub async fn retry_delivery(&self, delivery_id: &str) -> Result<bool, EngineError> {
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
}

#[cfg(all(test, feature = "http-client"))]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::scheduler::InMemoryScheduler;
    use crate::store::InMemoryStore;
    use hooksmith_events::Event;

    fn noop_scheduler() -> Arc<InMemoryScheduler> {
        Arc::new(InMemoryScheduler::new(
            Arc::new(|_id: String| Box::pin(async move {})),
            8,
            100,
        ))
    }

    #[tokio::test]
    async fn run_drops_a_missing_delivery_without_panicking() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let scheduler: Arc<dyn Scheduler> = noop_scheduler();
        let worker = Worker::new(store, scheduler, EngineConfig::default());
        worker.run("does-not-exist".to_string()).await;
    }

    #[tokio::test]
    async fn run_drops_an_already_terminal_delivery() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let endpoint = Endpoint::new("https://sink.example/").with_all_events();
        store.create_endpoint(endpoint.clone()).await.unwrap();

        let mut delivery = Delivery::new(endpoint.id, Event::new("user.created", serde_json::json!({})));
        delivery.status = DeliveryStatus::Delivered;
        let id = delivery.id.clone();
        store.create_delivery(delivery).await.unwrap();

        let scheduler: Arc<dyn Scheduler> = noop_scheduler();
        let worker = Worker::new(store.clone(), scheduler, EngineConfig::default());
        worker.run(id.clone()).await;

        let unchanged = store.get_delivery(&id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn endpoint_gone_fails_fast_without_a_network_call() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let endpoint = Endpoint::new("https://sink.example/")
            .with_all_events()
            .inactive();
        let endpoint_id = endpoint.id.clone();
        store.create_endpoint(endpoint).await.unwrap();

        let delivery = Delivery::new(endpoint_id, Event::new("user.created", serde_json::json!({})));
        let id = delivery.id.clone();
        store.create_delivery(delivery).await.unwrap();

        let scheduler: Arc<dyn Scheduler> = noop_scheduler();
        let worker = Worker::new(store.clone(), scheduler, EngineConfig::default());
        worker.run(id.clone()).await;

        let result = store.get_delivery(&id).await.unwrap().unwrap();
        assert_eq!(result.status, DeliveryStatus::Failed);
        assert_eq!(result.error.as_deref(), Some(EngineError::EndpointGone.to_string().as_str()));
    }

    #[tokio::test]
    async fn operator_retry_on_delivered_is_a_no_op() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let endpoint = Endpoint::new("https://sink.example/").with_all_events();
        let endpoint_id = endpoint.id.clone();
        store.create_endpoint(endpoint).await.unwrap();

        let mut delivery = Delivery::new(endpoint_id, Event::new("user.created", serde_json::json!({})));
        delivery.status = DeliveryStatus::Delivered;
        let id = delivery.id.clone();
        store.create_delivery(delivery).await.unwrap();

        let scheduler: Arc<dyn Scheduler> = noop_scheduler();
        let worker = Worker::new(store, scheduler, EngineConfig::default());
        assert!(!worker.retry_delivery(&id).await.unwrap());
    }

    #[tokio::test]
    async fn operator_retry_on_failed_resets_and_reenqueues() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let endpoint = Endpoint::new("https://sink.example/").with_all_events();
        let endpoint_id = endpoint.id.clone();
        store.create_endpoint(endpoint).await.unwrap();

        let mut delivery = Delivery::new(endpoint_id, Event::new("user.created", serde_json::json!({})));
        delivery.begin_attempt();
        delivery.mark_failed("boom", None, Some(5));
        let id = delivery.id.clone();
        store.create_delivery(delivery).await.unwrap();

        let scheduler: Arc<dyn Scheduler> = noop_scheduler();
        let worker = Worker::new(store.clone(), scheduler, EngineConfig::default());
        assert!(worker.retry_delivery(&id).await.unwrap());

        let reset = store.get_delivery(&id).await.unwrap().unwrap();
        assert_eq!(reset.status, DeliveryStatus::Pending);
        assert_eq!(reset.attempts, 0);
    }
}

//! Pure aggregation over deliveries for one endpoint (§4.G Stats).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::delivery::DeliveryStatus;
use crate::error::EngineResult;
use crate::store::Store;

/// Delivery counts and timing for one endpoint, computed from a single
/// consistent Store snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStats {
    pub endpoint_id: String,
    pub delivered: usize,
    pub failed: usize,
    /// `pending` and `retrying` combined, per §4.G.
    pub in_flight: usize,
    pub total: usize,
    /// Zero when no attempt has recorded a duration.
    pub average_duration_ms: f64,
    /// `delivered / total * 100`; zero when `total == 0`.
    pub success_rate: f64,
}

impl Default for EndpointStats {
    fn default() -> Self {
        Self {
            endpoint_id: String::new(),
            delivered: 0,
            failed: 0,
            in_flight: 0,
            total: 0,
            average_duration_ms: 0.0,
            success_rate: 0.0,
        }
    }
}

/// Computes [`EndpointStats`] for a single endpoint.
pub struct Stats {
    store: Arc<dyn Store>,
}

impl Stats {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn for_endpoint(&self, endpoint_id: &str) -> EngineResult<EndpointStats> {
        let deliveries = self.store.all_deliveries_for_endpoint(endpoint_id).await?;

        let mut stats = EndpointStats {
            endpoint_id: endpoint_id.to_string(),
            ..EndpointStats::default()
        };
        stats.total = deliveries.len();

        let mut duration_sum = 0u64;
        let mut duration_count = 0u64;

        for delivery in &deliveries {
            match delivery.status {
                DeliveryStatus::Delivered => stats.delivered += 1,
                DeliveryStatus::Failed => stats.failed += 1,
                DeliveryStatus::Pending | DeliveryStatus::Retrying => stats.in_flight += 1,
            }
            if let Some(duration) = delivery.duration_ms {
                duration_sum += duration;
                duration_count += 1;
            }
        }

        stats.average_duration_ms = if duration_count > 0 {
            duration_sum as f64 / duration_count as f64
        } else {
            0.0
        };
        stats.success_rate = if stats.total > 0 {
            stats.delivered as f64 / stats.total as f64 * 100.0
        } else {
            0.0
        };

        Ok(stats)
    }
}

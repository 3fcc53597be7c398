//! One attempt lineage of one event at one endpoint (§3 Delivery).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hooksmith_events::Event;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::retry::RetryConfig;

/// Response snapshot from the most recent attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub status_code: u16,
    /// Truncated to at most 4 KiB of UTF-8 text.
    pub body: String,
    pub headers: HashMap<String, String>,
}

/// Cap, in bytes, on retained response body text.
pub const MAX_RESPONSE_BODY_BYTES: usize = 4 * 1024;

/// Truncates `text` to at most `MAX_RESPONSE_BODY_BYTES` bytes without
/// splitting a UTF-8 code point.
pub fn truncate_response_body(text: &str) -> String {
    if text.len() <= MAX_RESPONSE_BODY_BYTES {
        return text.to_string();
    }
    let mut end = MAX_RESPONSE_BODY_BYTES;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

/// The record of every attempt made to push one [`Event`] to one
/// endpoint. Mutated only by the Attempt Worker owning the current
/// attempt, and by an explicit operator retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub endpoint_id: String,
    pub event_id: String,
    pub event: Event,
    pub status: DeliveryStatus,
    /// Count of HTTP attempts made. Zero until the first attempt starts.
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set iff `status == Retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response: Option<DeliveryResponse>,
    pub error: Option<String>,
    /// Milliseconds taken by the most recent attempt.
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Delivery {
    /// Creates a fresh, unattempted delivery in status `Pending`.
    pub fn new(endpoint_id: impl Into<String>, event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint_id: endpoint_id.into(),
            event_id: event.id.clone(),
            event,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            next_retry_at: None,
            response: None,
            error: None,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this delivery has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }

    /// Step 7 of the Attempt Worker: records that an attempt is starting,
    /// before the network call.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.last_attempt_at = Some(Utc::now());
        self.status = DeliveryStatus::Pending;
        self.next_retry_at = None;
    }

    pub fn mark_delivered(&mut self, response: DeliveryResponse, duration_ms: u64) {
        self.status = DeliveryStatus::Delivered;
        self.response = Some(response);
        self.error = None;
        self.duration_ms = Some(duration_ms);
        self.next_retry_at = None;
    }

    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        response: Option<DeliveryResponse>,
        duration_ms: Option<u64>,
    ) {
        self.status = DeliveryStatus::Failed;
        self.error = Some(error.into());
        self.response = response;
        self.duration_ms = duration_ms;
        self.next_retry_at = None;
    }

    /// Schedules a retry per the backoff formula, or fails terminally if
    /// the retry budget is exhausted.
    pub fn schedule_retry_or_fail(
        &mut self,
        retry_config: &RetryConfig,
        error: impl Into<String>,
        response: Option<DeliveryResponse>,
        duration_ms: Option<u64>,
    ) -> Option<std::time::Duration> {
        self.response = response;
        self.duration_ms = duration_ms;
        let error = error.into();

        if retry_config.should_retry(self.attempts) {
            let delay = retry_config.delay_for(self.attempts);
            self.status = DeliveryStatus::Retrying;
            self.error = Some(error);
            self.next_retry_at = Some(
                Utc::now()
                    + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::zero()),
            );
            Some(delay)
        } else {
            self.status = DeliveryStatus::Failed;
            self.error = Some(error);
            self.next_retry_at = None;
            None
        }
    }

    /// Operator retry: allowed on any non-`Delivered` delivery. Returns
    /// `false` (no-op) if already `Delivered`.
    pub fn operator_retry(&mut self) -> bool {
        if self.status == DeliveryStatus::Delivered {
            return false;
        }
        self.attempts = 0;
        self.status = DeliveryStatus::Pending;
        self.error = None;
        self.next_retry_at = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_delivery() -> Delivery {
        Delivery::new("ep-1", Event::new("user.created", serde_json::json!({"uid": 1})))
    }

    #[test]
    fn new_delivery_starts_pending_with_zero_attempts() {
        let d = sample_delivery();
        assert_eq!(d.status, DeliveryStatus::Pending);
        assert_eq!(d.attempts, 0);
        assert!(!d.is_terminal());
    }

    #[test]
    fn begin_attempt_increments_and_clears_next_retry() {
        let mut d = sample_delivery();
        d.next_retry_at = Some(Utc::now());
        d.begin_attempt();
        assert_eq!(d.attempts, 1);
        assert!(d.last_attempt_at.is_some());
        assert!(d.next_retry_at.is_none());
    }

    #[test]
    fn schedule_retry_sets_retrying_within_budget() {
        let mut d = sample_delivery();
        d.begin_attempt();
        let cfg = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
        };
        let delay = d.schedule_retry_or_fail(&cfg, "server error", None, Some(42));
        assert_eq!(delay, Some(Duration::from_secs(1)));
        assert_eq!(d.status, DeliveryStatus::Retrying);
        assert!(d.next_retry_at.is_some());
    }

    #[test]
    fn schedule_retry_fails_terminally_when_budget_exhausted() {
        let mut d = sample_delivery();
        let cfg = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        d.begin_attempt();
        let delay = d.schedule_retry_or_fail(&cfg, "server error", None, Some(10));
        assert_eq!(delay, None);
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert_eq!(d.attempts, 1);
    }

    #[test]
    fn operator_retry_resets_a_failed_delivery() {
        let mut d = sample_delivery();
        d.begin_attempt();
        d.mark_failed("boom", None, Some(5));
        assert!(d.operator_retry());
        assert_eq!(d.status, DeliveryStatus::Pending);
        assert_eq!(d.attempts, 0);
        assert!(d.error.is_none());
    }

    #[test]
    fn operator_retry_is_a_no_op_on_delivered() {
        let mut d = sample_delivery();
        d.begin_attempt();
        d.mark_delivered(
            DeliveryResponse {
                status_code: 204,
                body: String::new(),
                headers: HashMap::new(),
            },
            12,
        );
        assert!(!d.operator_retry());
        assert_eq!(d.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn response_body_truncation_preserves_utf8_boundaries() {
        let text = "é".repeat(MAX_RESPONSE_BODY_BYTES);
        let truncated = truncate_response_body(&text);
        assert!(truncated.len() <= MAX_RESPONSE_BODY_BYTES);
        assert!(String::from_utf8(truncated.into_bytes()).is_ok());
    }
}

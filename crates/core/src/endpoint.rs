//! Subscriber endpoint configuration (§3 Endpoint).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::retry::RetryConfig;

/// Prefix stamped on every system-generated secret, so a glance at a
/// value identifies it as a webhook secret rather than some other token.
pub const SECRET_PREFIX: &str = "whsec_";

/// A registered subscriber: URL, secret, and event filter.
///
/// `id` is immutable once created. `secret` only ever changes through
/// [`Endpoint::rotate_secret`], which overwrites it atomically — nothing
/// else is allowed to set it after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub url: String,
    pub secret: String,
    /// Event-type strings this endpoint subscribes to. The literal `"*"`
    /// matches any event type; there is no other wildcard syntax.
    pub events: HashSet<String>,
    /// Inactive endpoints are skipped by dispatch and cause in-flight
    /// attempts against them to fail fast with `EndpointGone`.
    pub active: bool,
    /// Additional headers merged into every outbound request. Must not
    /// name any of the four reserved headers; the Worker silently drops
    /// any that do.
    pub headers: HashMap<String, String>,
    /// Overrides the engine's default retry policy for this endpoint.
    pub retry_config: Option<RetryConfig>,
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    /// Creates a new, active endpoint with a system-generated secret.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            secret: generate_secret(),
            events: HashSet::new(),
            active: true,
            headers: HashMap::new(),
            retry_config: None,
            created_at: Utc::now(),
        }
    }

    /// Subscribes to the given event types (replacing any prior filter).
    pub fn with_events(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.events = events.into_iter().map(|e| e.into()).collect();
        self
    }

    /// Subscribes to every event type.
    pub fn with_all_events(mut self) -> Self {
        self.events = HashSet::from(["*".to_string()]);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether this endpoint should receive `event_type`, given it is
    /// active. `events = []` matches nothing; `events` containing `"*"`
    /// matches everything; matching is exact, case-sensitive otherwise.
    pub fn matches(&self, event_type: &str) -> bool {
        self.active && (self.events.contains("*") || self.events.contains(event_type))
    }

    /// Generates a fresh secret and overwrites the current one. The
    /// returned string is the only place the new secret is visible —
    /// callers must persist it through `Store::update_endpoint` and hand
    /// it back to whoever needs to configure the subscriber side.
    pub fn rotate_secret(&mut self) -> &str {
        self.secret = generate_secret();
        &self.secret
    }
}

fn generate_secret() -> String {
    format!("{SECRET_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_any_event_type() {
        let e = Endpoint::new("https://sink.example/").with_all_events();
        assert!(e.matches("user.created"));
        assert!(e.matches("anything.at.all"));
    }

    #[test]
    fn empty_event_set_matches_nothing() {
        let e = Endpoint::new("https://sink.example/");
        assert!(!e.matches("user.created"));
    }

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        let e = Endpoint::new("https://sink.example/").with_events(["user.created"]);
        assert!(e.matches("user.created"));
        assert!(!e.matches("User.Created"));
        assert!(!e.matches("user.deleted"));
    }

    #[test]
    fn inactive_endpoint_matches_nothing() {
        let e = Endpoint::new("https://sink.example/")
            .with_all_events()
            .inactive();
        assert!(!e.matches("user.created"));
    }

    #[test]
    fn secrets_are_system_generated_and_prefixed() {
        let e = Endpoint::new("https://sink.example/");
        assert!(e.secret.starts_with(SECRET_PREFIX));
    }

    #[test]
    fn rotate_secret_replaces_the_value() {
        let mut e = Endpoint::new("https://sink.example/");
        let original = e.secret.clone();
        let rotated = e.rotate_secret().to_string();
        assert_ne!(original, rotated);
        assert_eq!(e.secret, rotated);
    }
}

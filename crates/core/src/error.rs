//! Engine error taxonomy.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy for the delivery engine (§7).
///
/// The `retryable()` / `terminal()` helpers classify each kind per the
/// Attempt Worker's state machine; they are the single source of truth
/// the worker consults when deciding whether to reschedule.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Endpoint missing or inactive at attempt time. Non-retryable, terminal.
    #[error("endpoint gone")]
    EndpointGone,

    /// Serialized body exceeds `max_payload_size`. Non-retryable, terminal.
    #[error("payload too large")]
    PayloadTooLarge,

    /// 4xx response other than 408/429. Non-retryable, terminal.
    #[error("client error: {0}")]
    HttpClientError(u16),

    /// 5xx, 408, or 429 response. Retryable.
    #[error("server error: {0}")]
    HttpServerError(u16),

    /// Connection refused/reset, DNS failure, TLS failure, etc. Retryable.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Request deadline exceeded. Retryable.
    #[error("request timed out")]
    Timeout,

    /// Non-followed 3xx response. Non-retryable by default.
    #[error("unexpected redirect to {0}")]
    UnexpectedRedirect(String),

    /// Dispatch rejected for backpressure; no Delivery record is created.
    #[error("dispatcher overloaded")]
    Overloaded,

    /// Inbound verification: signature did not match.
    #[error("bad signature")]
    BadSignature,

    /// Inbound verification: timestamp outside tolerance.
    #[error("stale timestamp")]
    StaleTimestamp,

    /// Inbound verification: header could not be parsed.
    #[error("malformed signature header")]
    MalformedSignature,

    /// The referenced endpoint does not exist.
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    /// The referenced delivery does not exist.
    #[error("delivery not found: {0}")]
    DeliveryNotFound(String),

    /// Store-backend failure.
    #[error("store error: {0}")]
    StoreError(String),

    /// Configuration could not be parsed or was invalid.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the Attempt Worker should reschedule on this error (§4.E.9).
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::HttpServerError(_) | EngineError::NetworkError(_) | EngineError::Timeout
        )
    }

    /// Whether this error terminates the delivery without further attempts.
    pub fn terminal(&self) -> bool {
        matches!(
            self,
            EngineError::EndpointGone
                | EngineError::PayloadTooLarge
                | EngineError::HttpClientError(_)
                | EngineError::UnexpectedRedirect(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

#[cfg(feature = "http-client")]
impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::NetworkError(err.to_string())
        }
    }
}

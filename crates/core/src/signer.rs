//! HMAC-SHA-256 request signing and timing-safe verification (§4.A).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance, in seconds, for timestamp freshness checks.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Computes and verifies the engine's own `v1=<hex>` signature scheme.
///
/// The signature covers the exact bytes sent on the wire, not a parsed
/// representation of them — callers must sign the same byte slice they
/// are about to transmit.
pub struct Signer {
    secret: String,
}

impl Signer {
    /// Creates a signer bound to one endpoint secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes `HMAC-SHA-256(secret, timestamp || "." || body)` and emits
    /// it as `v1=<lowercase hex>`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        format!("v1={}", self.hex_digest(timestamp, body))
    }

    fn hex_digest(&self, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies a `v1=<hex>` signature against `body` and `timestamp`,
    /// rejecting timestamps more than `tolerance_secs` away from now.
    pub fn verify(
        &self,
        body: &[u8],
        signature: &str,
        timestamp: i64,
        tolerance_secs: i64,
    ) -> Result<(), EngineError> {
        let now = chrono::Utc::now().timestamp();
        if (now - timestamp).abs() > tolerance_secs {
            return Err(EngineError::StaleTimestamp);
        }

        let candidate = signature
            .strip_prefix("v1=")
            .ok_or(EngineError::MalformedSignature)?;
        let expected = self.hex_digest(timestamp, body);

        if constant_time_eq(expected.as_bytes(), candidate.as_bytes()) {
            Ok(())
        } else {
            Err(EngineError::BadSignature)
        }
    }
}

/// Compares two byte strings in time independent of the position of the
/// first differing byte. A length mismatch is rejected immediately
/// without scanning either input — per §9, that guard is acceptable
/// because the two possible lengths here are both fixed and known to the
/// attacker in advance (hex-encoded SHA-256 digests), so it leaks nothing
/// a per-byte short-circuit would.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

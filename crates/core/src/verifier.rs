//! Inbound signature verification for webhooks arriving from third parties
//! (§4.F). Every function here is stateless and side-effect free: none of
//! them ever panics on malformed input, they return `false` instead.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

use crate::signer::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

fn hmac_hex(secret: &[u8], message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn fresh(timestamp: i64, tolerance_secs: i64) -> bool {
    (chrono::Utc::now().timestamp() - timestamp).abs() <= tolerance_secs
}

/// Verifies this engine's own scheme: a `v1=<hex>` signature header plus a
/// separate unix-seconds timestamp header, both supplied as strings.
pub fn verify_v1(
    body: &[u8],
    signature_header: &str,
    timestamp_header: &str,
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    let Ok(timestamp) = timestamp_header.parse::<i64>() else {
        return false;
    };
    let Some(candidate) = signature_header.strip_prefix("v1=") else {
        return false;
    };
    if !fresh(timestamp, tolerance_secs) {
        return false;
    }
    let message = format!("{}.{}", timestamp, String::from_utf8_lossy(body));
    let Some(expected) = hmac_hex(secret.as_bytes(), message.as_bytes()) else {
        return false;
    };
    constant_time_eq(expected.as_bytes(), candidate.as_bytes())
}

/// Parses a comma-separated `k=v` element list into a multimap, since
/// scheme S carries more than one `v1` element (current signature plus
/// secret-rotation overlap signatures).
fn parse_kv_list(header: &str) -> HashMap<&str, Vec<&str>> {
    let mut parts: HashMap<&str, Vec<&str>> = HashMap::new();
    for element in header.split(',') {
        let mut kv = element.splitn(2, '=');
        if let (Some(k), Some(v)) = (kv.next(), kv.next()) {
            parts.entry(k.trim()).or_default().push(v.trim());
        }
    }
    parts
}

/// Verifies scheme S: a single header of comma-separated `k=v` elements,
/// timestamp under key `t`, one or more candidate signatures under keys
/// starting with `v1`. Matches if the computed signature equals any one
/// of the `v1` values.
pub fn verify_scheme_s(body: &[u8], header: &str, secret: &str, tolerance_secs: i64) -> bool {
    let parts = parse_kv_list(header);

    let Some(timestamp) = parts
        .get("t")
        .and_then(|v| v.first())
        .and_then(|t| t.parse::<i64>().ok())
    else {
        return false;
    };
    if !fresh(timestamp, tolerance_secs) {
        return false;
    }

    let candidates: Vec<&&str> = parts
        .iter()
        .filter(|(k, _)| k.starts_with("v1"))
        .flat_map(|(_, v)| v.iter())
        .collect();
    if candidates.is_empty() {
        return false;
    }

    let message = format!("{}.{}", timestamp, String::from_utf8_lossy(body));
    let Some(expected) = hmac_hex(secret.as_bytes(), message.as_bytes()) else {
        return false;
    };

    candidates
        .iter()
        .any(|candidate| constant_time_eq(expected.as_bytes(), candidate.as_bytes()))
}

/// Verifies scheme G: a single `sha256=<hex>` header over the raw body,
/// no timestamp component.
pub fn verify_scheme_g(body: &[u8], header: &str, secret: &str) -> bool {
    let Some(candidate) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Some(expected) = hmac_hex(secret.as_bytes(), body) else {
        return false;
    };
    constant_time_eq(expected.as_bytes(), candidate.as_bytes())
}

/// Verifies scheme L: signature and timestamp travel in separate headers;
/// the signed base string is `v0:<timestamp>:<body>` and the signature
/// header value is `v0=<hex>`.
pub fn verify_scheme_l(
    body: &[u8],
    signature_header: &str,
    timestamp_header: &str,
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    let Ok(timestamp) = timestamp_header.parse::<i64>() else {
        return false;
    };
    let Some(candidate) = signature_header.strip_prefix("v0=") else {
        return false;
    };
    if !fresh(timestamp, tolerance_secs) {
        return false;
    }
    let mut message = format!("v0:{}:", timestamp).into_bytes();
    message.extend_from_slice(body);
    let Some(expected) = hmac_hex(secret.as_bytes(), &message) else {
        return false;
    };
    constant_time_eq(expected.as_bytes(), candidate.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_s(secret: &str, ts: i64, body: &[u8]) -> String {
        let message = format!("{}.{}", ts, String::from_utf8_lossy(body));
        format!("t={},v1={}", ts, hmac_hex(secret.as_bytes(), message.as_bytes()).unwrap())
    }

    #[test]
    fn scheme_s_accepts_a_correctly_signed_header() {
        let now = chrono::Utc::now().timestamp();
        let body = b"{\"ok\":true}";
        let header = sign_s("shhh", now, body);
        assert!(verify_scheme_s(body, &header, "shhh", 300));
    }

    #[test]
    fn scheme_s_rejects_tampered_body() {
        let now = chrono::Utc::now().timestamp();
        let header = sign_s("shhh", now, b"original");
        assert!(!verify_scheme_s(b"tampered", &header, "shhh", 300));
    }

    #[test]
    fn scheme_s_rejects_stale_timestamp() {
        let stale = chrono::Utc::now().timestamp() - 600;
        let body = b"payload";
        let header = sign_s("shhh", stale, body);
        assert!(!verify_scheme_s(body, &header, "shhh", 300));
    }

    #[test]
    fn scheme_g_matches_plain_hmac_over_body() {
        let body = b"raw-bytes";
        let expected = hmac_hex(b"secret", body).unwrap();
        let header = format!("sha256={}", expected);
        assert!(verify_scheme_g(body, &header, "secret"));
        assert!(!verify_scheme_g(b"other-bytes", &header, "secret"));
    }

    #[test]
    fn scheme_l_uses_the_v0_base_string() {
        let now = chrono::Utc::now().timestamp();
        let body = b"event-body";
        let mut message = format!("v0:{}:", now).into_bytes();
        message.extend_from_slice(body);
        let sig = hmac_hex(b"l-secret", &message).unwrap();
        let header = format!("v0={}", sig);
        assert!(verify_scheme_l(body, &header, &now.to_string(), "l-secret", 300));
    }

    #[test]
    fn malformed_headers_never_panic_and_return_false() {
        assert!(!verify_scheme_s(b"x", "not-kv-pairs", "secret", 300));
        assert!(!verify_scheme_g(b"x", "missing-prefix", "secret"));
        assert!(!verify_scheme_l(b"x", "v0=abc", "not-a-number", "secret", 300));
        assert!(!verify_v1(b"x", "bad", "also-bad", "secret", 300));
    }
}

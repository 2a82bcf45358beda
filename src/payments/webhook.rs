//! Stripe webhook signature verification and event decoding.
//!
//! The `Stripe-Signature` header looks like `t=1492774577,v1=5257a8...,v1=...`.
//! The signed payload is `"{t}.{raw body}"`, HMAC-SHA256 keyed with the
//! endpoint secret. Several `v1` entries may be present while a secret is
//! being rolled; any match is accepted.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed event, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("timestamp outside tolerance window")]
    Expired,
    #[error("no matching signature")]
    Mismatch,
    #[error("invalid secret key")]
    InvalidSecret,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_signature_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            "v1" if !value.is_empty() => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(SignatureError::MalformedHeader),
    }
}

pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify `header` against `payload` at time `now` (unix seconds).
pub fn verify_signature_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_signature_header(header)?;

    let age = now
        .checked_sub(parsed.timestamp)
        .map(i64::unsigned_abs)
        .ok_or(SignatureError::Expired)?;
    if age > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let expected = compute_signature(secret, parsed.timestamp, payload)?;
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> Result<(), SignatureError> {
    verify_signature_at(
        payload,
        header,
        secret,
        DEFAULT_TOLERANCE_SECS,
        Utc::now().timestamp(),
    )
}

#[derive(Debug, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

#[derive(Debug, Deserialize)]
pub struct EventObject {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn header_for(payload: &[u8], timestamp: i64) -> String {
        let sig = compute_signature(SECRET, timestamp, payload).unwrap();
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn parses_timestamp_and_all_v1_signatures() {
        let parsed = parse_signature_header("t=1609459200,v1=abc,v0=ignored,v1=def").unwrap();
        assert_eq!(parsed.timestamp, 1_609_459_200);
        assert_eq!(parsed.signatures, vec!["abc", "def"]);
    }

    #[test]
    fn rejects_header_without_signature() {
        assert_eq!(
            parse_signature_header("t=1609459200"),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            parse_signature_header("garbage"),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            parse_signature_header("t=soon,v1=abc"),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let header = header_for(payload, NOW - 10);
        assert_eq!(
            verify_signature_at(payload, &header, SECRET, DEFAULT_TOLERANCE_SECS, NOW),
            Ok(())
        );
    }

    #[test]
    fn accepts_any_matching_signature_during_rotation() {
        let payload = b"{}";
        let good = compute_signature(SECRET, NOW, payload).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={good}");
        assert!(verify_signature_at(payload, &header, SECRET, DEFAULT_TOLERANCE_SECS, NOW).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let header = header_for(b"original", NOW);
        assert_eq!(
            verify_signature_at(b"tampered", &header, SECRET, DEFAULT_TOLERANCE_SECS, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = header_for(b"body", NOW);
        assert_eq!(
            verify_signature_at(b"body", &header, "whsec_other", DEFAULT_TOLERANCE_SECS, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = header_for(b"body", NOW - 600);
        assert_eq!(
            verify_signature_at(b"body", &header, SECRET, DEFAULT_TOLERANCE_SECS, NOW),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn extreme_timestamps_are_expired_not_overflowed() {
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={timestamp},v1=00");
            assert_eq!(
                verify_signature_at(b"body", &header, SECRET, DEFAULT_TOLERANCE_SECS, NOW),
                Err(SignatureError::Expired)
            );
        }
        let header = format!("t={},v1=00", i64::MIN);
        assert_eq!(
            verify_signature_at(b"body", &header, SECRET, DEFAULT_TOLERANCE_SECS, i64::MAX),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn decodes_payment_intent_event() {
        let raw = r#"{
            "id": "evt_123",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_456", "amount": 1490, "status": "succeeded" } }
        }"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, PAYMENT_INTENT_SUCCEEDED);
        assert_eq!(event.data.object.id, "pi_456");
    }
}

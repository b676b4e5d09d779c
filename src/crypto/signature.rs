//! Signed tag payloads with expiry.
//!
//! Wire format (ASCII, pipe-delimited, `SIG` always last):
//!
//! ```text
//! <data>|TIME:<unix-ms>|NONCE:<6 base36>|DEVICE:<64 hex>|SIG:<16 hex>
//! ```
//!
//! `SIG` is the first 16 hex characters of SHA-256 over everything before
//! `|SIG:` followed by the shared secret. Truncation keeps the payload small
//! enough for common tags at the cost of collision resistance.

use std::time::Duration;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::utils::{now_ms, random_base36, sha256_hex};
use crate::security::{SecurityEvent, Severity, ThreatType};

/// Hex characters of the hash kept in `SIG`.
pub const SIGNATURE_HEX_LENGTH: usize = 16;

/// Characters in the random nonce.
pub const NONCE_LENGTH: usize = 6;

/// Default time a signed payload stays fresh.
pub const DEFAULT_EXPIRY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Practical write ceiling for common tag types, in bytes.
pub const DEFAULT_PAYLOAD_CAPACITY: usize = 200;

const SIG_MARKER: &str = "|SIG:";
const TIME_MARKER: &str = "|TIME:";
const NONCE_MARKER: &str = "|NONCE:";
const DEVICE_MARKER: &str = "|DEVICE:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Signed payload is {len} bytes, exceeding the {max}-byte tag capacity")]
    CapacityExceeded { len: usize, max: usize },
    #[error("Signed payload is missing the {0} field")]
    MissingField(&'static str),
    #[error("Signed payload has an invalid {0} field")]
    InvalidField(&'static str),
}

/// Shared signing secret. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Parsed form of the signed-payload wire string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub data: String,
    /// Signing time, Unix ms.
    pub time: u64,
    pub nonce: String,
    /// Device fingerprint of the signer.
    pub device: String,
    pub sig: String,
}

impl SignedPayload {
    /// Whether a string looks like a signed payload (carries a `SIG` field).
    pub fn is_signed(wire: &str) -> bool {
        wire.contains(SIG_MARKER)
    }

    /// Parse the wire string. Fields are located from the right so `data`
    /// may itself contain `|`.
    pub fn parse(wire: &str) -> Result<Self, SignatureError> {
        let (body, sig) = split_signature(wire).ok_or(SignatureError::MissingField("SIG"))?;
        let (rest, device) = body
            .rsplit_once(DEVICE_MARKER)
            .ok_or(SignatureError::MissingField("DEVICE"))?;
        let (rest, nonce) = rest
            .rsplit_once(NONCE_MARKER)
            .ok_or(SignatureError::MissingField("NONCE"))?;
        let (data, time) = rest
            .rsplit_once(TIME_MARKER)
            .ok_or(SignatureError::MissingField("TIME"))?;
        // Plain decimal digits only, and small enough to subtract as i64
        if time.is_empty() || !time.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SignatureError::InvalidField("TIME"));
        }
        let time = time
            .parse::<u64>()
            .ok()
            .filter(|t| *t <= i64::MAX as u64)
            .ok_or(SignatureError::InvalidField("TIME"))?;

        Ok(Self {
            data: data.to_string(),
            time,
            nonce: nonce.to_string(),
            device: device.to_string(),
            sig: sig.to_string(),
        })
    }

    /// Everything the signature covers.
    pub fn signed_portion(&self) -> String {
        format!(
            "{}{}{}{}{}{}{}",
            self.data, TIME_MARKER, self.time, NONCE_MARKER, self.nonce, DEVICE_MARKER, self.device
        )
    }

    /// The wire string written to the tag.
    pub fn to_wire(&self) -> String {
        format!("{}{}{}", self.signed_portion(), SIG_MARKER, self.sig)
    }
}

/// Result of verifying a signed payload. Validity and expiry are independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub is_valid: bool,
    pub is_expired: bool,
    /// `now - TIME` in ms, when `TIME` could be read.
    pub age_ms: Option<i64>,
    pub payload: Option<SignedPayload>,
    /// Signature findings (invalid and/or expired), untagged.
    pub events: Vec<SecurityEvent>,
}

/// Produces and verifies signed payloads.
#[derive(Debug, Clone)]
pub struct SignatureService {
    expiry_window: Duration,
    capacity: usize,
}

impl Default for SignatureService {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY_WINDOW, DEFAULT_PAYLOAD_CAPACITY)
    }
}

impl SignatureService {
    pub fn new(expiry_window: Duration, capacity: usize) -> Self {
        Self {
            expiry_window,
            capacity,
        }
    }

    pub fn expiry_window(&self) -> Duration {
        self.expiry_window
    }

    /// Sign `data` now with a fresh nonce.
    pub fn sign(
        &self,
        data: &str,
        secret: &SigningSecret,
        device_fingerprint: &str,
    ) -> Result<SignedPayload, SignatureError> {
        self.sign_at(
            data,
            secret,
            device_fingerprint,
            now_ms(),
            &random_base36(NONCE_LENGTH),
        )
    }

    /// Sign with an explicit clock and nonce.
    pub fn sign_at(
        &self,
        data: &str,
        secret: &SigningSecret,
        device_fingerprint: &str,
        now_ms: u64,
        nonce: &str,
    ) -> Result<SignedPayload, SignatureError> {
        let mut payload = SignedPayload {
            data: data.to_string(),
            time: now_ms,
            nonce: nonce.to_string(),
            device: device_fingerprint.to_string(),
            sig: String::new(),
        };
        payload.sig = compute_signature(&payload.signed_portion(), secret);

        let len = payload.to_wire().len();
        if len > self.capacity {
            return Err(SignatureError::CapacityExceeded {
                len,
                max: self.capacity,
            });
        }

        Ok(payload)
    }

    /// Verify a wire string against the secret at the current time.
    pub fn verify(&self, wire: &str, secret: &SigningSecret) -> Verification {
        self.verify_at(wire, secret, now_ms())
    }

    /// Verify with an explicit clock. The clock only affects `is_expired`.
    pub fn verify_at(&self, wire: &str, secret: &SigningSecret, now_ms: u64) -> Verification {
        let payload = match SignedPayload::parse(wire) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Signed payload rejected: {}", e);
                return Verification {
                    is_valid: false,
                    is_expired: false,
                    age_ms: None,
                    payload: None,
                    events: vec![SecurityEvent::new(
                        ThreatType::SignatureInvalid,
                        Severity::High,
                        format!("Unparseable signed payload: {}", e),
                        now_ms,
                        true,
                    )],
                };
            }
        };

        // Hash the bytes exactly as they appear on the tag
        let body = split_signature(wire).map(|(body, _)| body).unwrap_or_default();
        let expected = compute_signature(body, secret);
        // Plain equality; not constant-time.
        let is_valid = expected == payload.sig;

        let age_ms = (now_ms as i128 - payload.time as i128)
            .clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        let is_expired = age_ms > self.expiry_window.as_millis() as i64;

        let mut events = Vec::new();
        if !is_valid {
            events.push(SecurityEvent::new(
                ThreatType::SignatureInvalid,
                Severity::High,
                "Signature does not match payload contents",
                now_ms,
                true,
            ));
        }
        if is_expired {
            events.push(SecurityEvent::new(
                ThreatType::ExpiredSignature,
                Severity::Medium,
                format!(
                    "Signature is {}s old, beyond the {}s expiry window",
                    age_ms / 1000,
                    self.expiry_window.as_secs()
                ),
                now_ms,
                true,
            ));
        }

        Verification {
            is_valid,
            is_expired,
            age_ms: Some(age_ms),
            payload: Some(payload),
            events,
        }
    }
}

/// Split at the last `|SIG:` marker into `(signed body, signature)`.
fn split_signature(wire: &str) -> Option<(&str, &str)> {
    wire.rsplit_once(SIG_MARKER)
}

fn compute_signature(body: &str, secret: &SigningSecret) -> String {
    let mut hash = sha256_hex(&[body.as_bytes(), secret.as_bytes()]);
    hash.truncate(SIGNATURE_HEX_LENGTH);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: &str = "3f6c1b1f2a4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7";
    const T0: u64 = 1_700_000_000_000;

    fn secret() -> SigningSecret {
        SigningSecret::new("k")
    }

    fn signed(data: &str) -> SignedPayload {
        SignatureService::default()
            .sign_at(data, &secret(), DEVICE, T0, "a1b2c3")
            .unwrap()
    }

    #[test]
    fn test_wire_format_layout() {
        let wire = signed("UID:AABBCCDD|SECURE:true").to_wire();
        assert!(wire.starts_with("UID:AABBCCDD|SECURE:true|TIME:1700000000000|NONCE:a1b2c3|DEVICE:"));
        let sig = wire.rsplit_once("|SIG:").unwrap().1;
        assert_eq!(sig.len(), SIGNATURE_HEX_LENGTH);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(wire.len() <= DEFAULT_PAYLOAD_CAPACITY);
    }

    #[test]
    fn test_sign_generates_nonce() {
        let payload = SignatureService::default()
            .sign("x", &secret(), DEVICE)
            .unwrap();
        assert_eq!(payload.nonce.len(), NONCE_LENGTH);
        assert!(payload.time > 0);
    }

    #[test]
    fn test_scenario_fresh_then_expired() {
        let service = SignatureService::default();
        let wire = signed("UID:AABBCCDD|SECURE:true").to_wire();

        let fresh = service.verify_at(&wire, &secret(), T0);
        assert!(fresh.is_valid);
        assert!(!fresh.is_expired);
        assert!(fresh.events.is_empty());

        let later = service.verify_at(&wire, &secret(), T0 + 301_000);
        assert!(later.is_valid);
        assert!(later.is_expired);
        assert_eq!(later.events.len(), 1);
        assert_eq!(later.events[0].threat_type, ThreatType::ExpiredSignature);
    }

    #[test]
    fn test_expiry_boundary() {
        let service = SignatureService::default();
        let wire = signed("door-7").to_wire();
        let window = DEFAULT_EXPIRY_WINDOW.as_millis() as u64;

        let before = service.verify_at(&wire, &secret(), T0 + window - 1);
        assert!(before.is_valid);
        assert!(!before.is_expired);

        let after = service.verify_at(&wire, &secret(), T0 + window + 1);
        assert!(after.is_valid);
        assert!(after.is_expired);
    }

    #[test]
    fn test_custom_expiry_window() {
        let service = SignatureService::new(Duration::from_secs(10), DEFAULT_PAYLOAD_CAPACITY);
        let wire = signed("door-7").to_wire();
        assert!(!service.verify_at(&wire, &secret(), T0 + 9_000).is_expired);
        assert!(service.verify_at(&wire, &secret(), T0 + 11_000).is_expired);
    }

    #[test]
    fn test_any_single_byte_flip_invalidates() {
        let service = SignatureService::default();
        let wire = signed("UID:AABBCCDD|SECURE:true").to_wire();
        let sig_start = wire.rfind("|SIG:").unwrap();

        for i in 0..sig_start {
            let mut bytes = wire.clone().into_bytes();
            bytes[i] ^= 0x01;
            let tampered = String::from_utf8(bytes).unwrap();
            let result = service.verify_at(&tampered, &secret(), T0);
            assert!(!result.is_valid, "flip at byte {} went undetected", i);
        }
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let wire = signed("door-7").to_wire();
        let result =
            SignatureService::default().verify_at(&wire, &SigningSecret::new("other"), T0);
        assert!(!result.is_valid);
        assert_eq!(result.events[0].threat_type, ThreatType::SignatureInvalid);
        assert_eq!(result.events[0].severity, Severity::High);
    }

    #[test]
    fn test_missing_sig_raises_event() {
        let result = SignatureService::default().verify_at(
            "door-7|TIME:1|NONCE:abcdef|DEVICE:00",
            &secret(),
            T0,
        );
        assert!(!result.is_valid);
        assert!(!result.is_expired);
        assert!(result.payload.is_none());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].threat_type, ThreatType::SignatureInvalid);
        assert_eq!(result.events[0].severity, Severity::High);
    }

    #[test]
    fn test_missing_time_raises_event() {
        let result = SignatureService::default().verify_at(
            "door-7|NONCE:abcdef|DEVICE:00|SIG:0123456789abcdef",
            &secret(),
            T0,
        );
        assert!(!result.is_valid);
        assert_eq!(result.events[0].threat_type, ThreatType::SignatureInvalid);
    }

    #[test]
    fn test_out_of_range_time_raises_event() {
        let result = SignatureService::default().verify_at(
            "door|TIME:9223372036854775808|NONCE:abcdef|DEVICE:00|SIG:0123456789abcdef",
            &secret(),
            T0,
        );
        assert!(!result.is_valid);
        assert!(!result.is_expired);
        assert!(result.age_ms.is_none());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].threat_type, ThreatType::SignatureInvalid);
        assert_eq!(result.events[0].severity, Severity::High);
        assert!(result.events[0].blocked);

        let overflow = SignatureService::default().verify_at(
            "door|TIME:99999999999999999999999|NONCE:abcdef|DEVICE:00|SIG:0123456789abcdef",
            &secret(),
            T0,
        );
        assert!(!overflow.is_valid);
        assert_eq!(overflow.events[0].threat_type, ThreatType::SignatureInvalid);
    }

    #[test]
    fn test_non_digit_time_is_rejected() {
        for time in ["+1700000000000", "-5", " 17", "17e3", ""] {
            let wire = format!("door|TIME:{}|NONCE:abcdef|DEVICE:00|SIG:0123456789abcdef", time);
            assert_eq!(
                SignedPayload::parse(&wire),
                Err(SignatureError::InvalidField("TIME")),
                "TIME {:?} accepted",
                time
            );
            let result = SignatureService::default().verify_at(&wire, &secret(), T0);
            assert!(!result.is_valid);
            assert_eq!(result.events[0].threat_type, ThreatType::SignatureInvalid);
        }
    }

    #[test]
    fn test_largest_time_does_not_overflow() {
        let wire = SignatureService::default()
            .sign_at("door", &secret(), DEVICE, i64::MAX as u64, "a1b2c3")
            .unwrap()
            .to_wire();
        let result = SignatureService::default().verify_at(&wire, &secret(), T0);
        assert!(result.is_valid);
        assert!(!result.is_expired);
        assert!(result.age_ms.unwrap() < 0);

        // An age past i64::MAX saturates
        let result = SignatureService::default().verify_at(&wire, &secret(), u64::MAX);
        assert!(result.is_valid);
        assert!(result.is_expired);
        assert_eq!(result.age_ms, Some(i64::MAX));
    }

    #[test]
    fn test_future_dated_payload_is_not_expired() {
        let wire = signed("door-7").to_wire();
        let result = SignatureService::default().verify_at(&wire, &secret(), T0 - 60_000);
        assert!(result.is_valid);
        assert!(!result.is_expired);
        assert_eq!(result.age_ms, Some(-60_000));
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_capacity_exceeded() {
        let data = "x".repeat(150);
        let err = SignatureService::default()
            .sign_at(&data, &secret(), DEVICE, T0, "a1b2c3")
            .unwrap_err();
        assert!(matches!(err, SignatureError::CapacityExceeded { max: 200, .. }));
    }

    #[test]
    fn test_parse_round_trip() {
        let payload = signed("a|b|c");
        let parsed = SignedPayload::parse(&payload.to_wire()).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.data, "a|b|c");
    }

    #[test]
    fn test_is_signed() {
        assert!(SignedPayload::is_signed(&signed("d").to_wire()));
        assert!(!SignedPayload::is_signed("plain text"));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", secret()), "SigningSecret(<redacted>)");
    }
}

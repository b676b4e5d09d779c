//! Hashing, device fingerprints and signed tag payloads.
//!
//! Signatures are truncated SHA-256 over the payload body and a shared
//! secret, sized to fit small NFC tags.

pub mod fingerprint;
pub mod signature;
pub mod utils;

pub use fingerprint::{DeviceInfo, FingerprintService};
pub use signature::{SignatureError, SignatureService, SignedPayload, SigningSecret, Verification};
pub use utils::{bytes_to_hex, hex_to_bytes, now_ms, sha256_hex};

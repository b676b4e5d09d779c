//! Utility functions for hashing, randomness and timestamps.

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error)]
pub enum UtilError {
    #[error("Invalid hex string")]
    InvalidHex,
}

/// Generate cryptographically secure random bytes.
pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Generate a random lowercase base36 string of `len` characters.
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::rngs::OsRng;
    (0..len)
        .map(|_| BASE36_ALPHABET[rng.gen_range(0..BASE36_ALPHABET.len())] as char)
        .collect()
}

/// SHA-256 of the concatenated parts, hex-encoded (64 chars).
pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Convert a hex string to bytes. Accepts an optional `0x` prefix and `:` separators.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, UtilError> {
    let trimmed = hex.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let cleaned: String = trimmed.chars().filter(|c| *c != ':').collect();
    hex::decode(cleaned).map_err(|_| UtilError::InvalidHex)
}

/// Convert bytes to an uppercase hex string (tag ids are displayed this way).
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Get the current time in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_base36() {
        let nonce = random_base36(6);
        assert_eq!(nonce.len(), 6);
        assert!(nonce.bytes().all(|b| BASE36_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generate_random_bytes_len() {
        assert_eq!(generate_random_bytes(16).len(), 16);
        assert!(generate_random_bytes(0).is_empty());
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(&[b"abc".as_slice()]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        // Parts are hashed as one concatenated message
        assert_eq!(
            sha256_hex(&[b"a".as_slice(), b"bc".as_slice()]),
            sha256_hex(&[b"abc".as_slice()])
        );
    }

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(hex_to_bytes("0xAABBCCDD").unwrap(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(hex_to_bytes("04:a1:ff").unwrap(), vec![0x04, 0xA1, 0xFF]);
        assert_eq!(bytes_to_hex(&[0x04, 0xA1]), "04A1");
        assert!(hex_to_bytes("zz").is_err());
    }

    #[test]
    fn test_now_ms() {
        // Should be a reasonable timestamp (after 2024-01-01)
        assert!(now_ms() > 1704067200000);
    }
}

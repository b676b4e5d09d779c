//! NFC transceiver capability interface.
//!
//! The orchestrator only reaches the radio through `HardwareTransceiver`.
//! Platform drivers implement it; `SimulatedTransceiver` is an in-memory
//! implementation for demos and tests.

pub mod simulated;

pub use simulated::{SimulatedTag, SimulatedTransceiver};

use thiserror::Error;

/// Technology to request when acquiring a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechHint {
    Ndef,
    NfcA,
    IsoDep,
    MifareUltralight,
}

impl TechHint {
    pub fn name(&self) -> &'static str {
        match self {
            TechHint::Ndef => "Ndef",
            TechHint::NfcA => "NfcA",
            TechHint::IsoDep => "IsoDep",
            TechHint::MifareUltralight => "MifareUltralight",
        }
    }
}

/// Opaque handle to an acquired tag session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagHandle(pub u64);

/// Everything read off a tag in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    pub id: Vec<u8>,
    pub tech_types: Vec<String>,
    pub ndef_bytes: Vec<u8>,
    /// NDEF capacity in bytes.
    pub max_size: usize,
    pub is_writable: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HardwareError {
    #[error("NFC is not supported on this device")]
    Unsupported,
    #[error("No tag detected")]
    NoTag,
    #[error("Timed out waiting for a tag")]
    Timeout,
    #[error("Tag I/O failed: {0}")]
    Io(String),
}

/// Narrow interface to the NFC radio.
///
/// `release` is synchronous so it can run from `Drop` on every exit path,
/// including cancellation.
#[allow(async_fn_in_trait)]
pub trait HardwareTransceiver {
    fn is_supported(&self) -> bool;

    /// Wait for a tag and open a session for the given technology.
    async fn acquire(&self, tech: TechHint) -> Result<TagHandle, HardwareError>;

    async fn read_raw_tag(&self, handle: TagHandle) -> Result<RawTag, HardwareError>;

    async fn write_raw_tag(&self, handle: TagHandle, bytes: &[u8]) -> Result<(), HardwareError>;

    fn release(&self, handle: TagHandle);
}

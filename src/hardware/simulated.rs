//! In-memory transceiver holding at most one tag in the field.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{HardwareError, HardwareTransceiver, RawTag, TagHandle, TechHint};

/// A tag placed on the simulated reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedTag {
    pub id: Vec<u8>,
    pub tech_types: Vec<String>,
    pub ndef_bytes: Vec<u8>,
    pub max_size: usize,
    pub is_writable: bool,
}

impl SimulatedTag {
    /// An NTAG215-like tag: 504 bytes of NDEF storage, writable.
    pub fn ntag215(id: Vec<u8>, ndef_bytes: Vec<u8>) -> Self {
        Self {
            id,
            tech_types: vec![
                TechHint::NfcA.name().to_string(),
                TechHint::MifareUltralight.name().to_string(),
                TechHint::Ndef.name().to_string(),
            ],
            ndef_bytes,
            max_size: 504,
            is_writable: true,
        }
    }
}

pub struct SimulatedTransceiver {
    supported: bool,
    acquire_delay: Duration,
    tag: Mutex<Option<SimulatedTag>>,
    open: Mutex<HashSet<TagHandle>>,
    next_handle: AtomicU64,
}

impl Default for SimulatedTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransceiver {
    pub fn new() -> Self {
        Self {
            supported: true,
            acquire_delay: Duration::ZERO,
            tag: Mutex::new(None),
            open: Mutex::new(HashSet::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// A reader on a device without NFC.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn with_tag(self, tag: SimulatedTag) -> Self {
        self.present(tag);
        self
    }

    /// Delay before `acquire` sees the tag.
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Place a tag in the field, replacing any existing one.
    pub fn present(&self, tag: SimulatedTag) {
        if let Ok(mut slot) = self.tag.lock() {
            *slot = Some(tag);
        }
    }

    /// Current contents of the tag in the field.
    pub fn tag(&self) -> Option<SimulatedTag> {
        self.tag.lock().ok().and_then(|slot| slot.clone())
    }

    /// Number of sessions acquired and not yet released.
    pub fn open_handles(&self) -> usize {
        self.open.lock().map(|open| open.len()).unwrap_or(0)
    }

    fn check_open(&self, handle: TagHandle) -> Result<(), HardwareError> {
        let open = self
            .open
            .lock()
            .map_err(|_| HardwareError::Io("reader state poisoned".to_string()))?;
        if open.contains(&handle) {
            Ok(())
        } else {
            Err(HardwareError::Io(format!("handle {} is not open", handle.0)))
        }
    }

    fn current_tag(&self) -> Result<SimulatedTag, HardwareError> {
        self.tag
            .lock()
            .map_err(|_| HardwareError::Io("reader state poisoned".to_string()))?
            .clone()
            .ok_or(HardwareError::NoTag)
    }
}

impl HardwareTransceiver for SimulatedTransceiver {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn acquire(&self, tech: TechHint) -> Result<TagHandle, HardwareError> {
        if !self.supported {
            return Err(HardwareError::Unsupported);
        }
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }

        let tag = self.current_tag()?;
        if !tag.tech_types.iter().any(|t| t == tech.name()) {
            return Err(HardwareError::Io(format!(
                "tag does not support {}",
                tech.name()
            )));
        }

        let handle = TagHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.open
            .lock()
            .map_err(|_| HardwareError::Io("reader state poisoned".to_string()))?
            .insert(handle);
        log::debug!("Simulated reader acquired {} as handle {}", tech.name(), handle.0);
        Ok(handle)
    }

    async fn read_raw_tag(&self, handle: TagHandle) -> Result<RawTag, HardwareError> {
        self.check_open(handle)?;
        let tag = self.current_tag()?;
        Ok(RawTag {
            id: tag.id,
            tech_types: tag.tech_types,
            ndef_bytes: tag.ndef_bytes,
            max_size: tag.max_size,
            is_writable: tag.is_writable,
        })
    }

    async fn write_raw_tag(&self, handle: TagHandle, bytes: &[u8]) -> Result<(), HardwareError> {
        self.check_open(handle)?;
        let mut slot = self
            .tag
            .lock()
            .map_err(|_| HardwareError::Io("reader state poisoned".to_string()))?;
        let tag = slot.as_mut().ok_or(HardwareError::NoTag)?;

        if !tag.is_writable {
            return Err(HardwareError::Io("tag is read-only".to_string()));
        }
        if bytes.len() > tag.max_size {
            return Err(HardwareError::Io(format!(
                "{} bytes exceed tag capacity of {}",
                bytes.len(),
                tag.max_size
            )));
        }

        tag.ndef_bytes = bytes.to_vec();
        Ok(())
    }

    fn release(&self, handle: TagHandle) {
        if let Ok(mut open) = self.open.lock() {
            open.remove(&handle);
        }
        log::debug!("Simulated reader released handle {}", handle.0);
    }
}

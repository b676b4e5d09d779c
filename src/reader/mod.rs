//! Tag access orchestrator.
//!
//! Drives one read or write at a time against the NFC transceiver, runs the
//! codec, signature check and behavioral analysis, and returns a structured
//! decision. Every completed operation writes one access-log entry plus a
//! threat report per security event.

mod state;

pub use state::OperationState;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Notify;

use crate::config::SecurityConfig;
use crate::crypto::fingerprint::{DeviceInfo, FingerprintService};
use crate::crypto::signature::{
    SignatureError, SignatureService, SignedPayload, SigningSecret, Verification,
};
use crate::crypto::utils::{bytes_to_hex, now_ms};
use crate::hardware::{HardwareError, HardwareTransceiver, TagHandle, TechHint};
use crate::ndef::{self, DecodedRecord, NdefError, NdefRecord, DEFAULT_LANGUAGE};
use crate::security::{PatternStore, SecurityEvent, ThreatDetector};
use crate::store::{
    AccessLogEntry, KeyValueStore, SecurityLevel, SecurityLog, ThreatReport, ACCESS_PATTERNS_KEY,
};

/// Conditions that end an operation without a decision.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("NFC hardware is unavailable")]
    HardwareUnavailable,
    #[error("No tag detected")]
    NoTagDetected,
    #[error("Another NFC operation is already in progress")]
    OperationInProgress,
    #[error("Timed out waiting for a tag")]
    AcquireTimeout,
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Payload of {len} bytes exceeds capacity of {max} bytes")]
    CapacityExceeded { len: usize, max: usize },
    #[error("Tag is not writable")]
    TagNotWritable,
    #[error("Could not encode payload: {0}")]
    Encoding(String),
    #[error("Hardware error: {0}")]
    Hardware(String),
}

impl From<HardwareError> for AccessError {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::Unsupported => AccessError::HardwareUnavailable,
            HardwareError::NoTag => AccessError::NoTagDetected,
            HardwareError::Timeout => AccessError::AcquireTimeout,
            HardwareError::Io(msg) => AccessError::Hardware(msg),
        }
    }
}

impl From<SignatureError> for AccessError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::CapacityExceeded { len, max } => {
                AccessError::CapacityExceeded { len, max }
            }
            other => AccessError::Encoding(other.to_string()),
        }
    }
}

impl From<NdefError> for AccessError {
    fn from(err: NdefError) -> Self {
        match err {
            NdefError::CapacityExceeded { len, max, .. } => {
                AccessError::CapacityExceeded { len, max }
            }
            other => AccessError::Encoding(other.to_string()),
        }
    }
}

/// Why a completed read was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    SignatureInvalid,
    SignatureExpired,
    /// Behavioral rules that blocked the access.
    ThreatBlocked(Vec<SecurityEvent>),
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::SignatureInvalid => write!(f, "signature invalid"),
            DenialReason::SignatureExpired => write!(f, "signature expired"),
            DenialReason::ThreatBlocked(events) => {
                write!(f, "blocked by ")?;
                for (i, event) in events.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} ({:?})", event.threat_type.label(), event.severity)?;
                }
                Ok(())
            }
        }
    }
}

/// Contents of a tag captured by one read.
#[derive(Debug, Clone, PartialEq)]
pub struct TagData {
    pub id: Vec<u8>,
    pub tech_types: Vec<String>,
    /// In wire order.
    pub ndef_records: Vec<DecodedRecord>,
    pub max_size: usize,
    pub is_writable: bool,
    /// Capture time, Unix ms.
    pub timestamp: u64,
}

impl TagData {
    /// Tag id as uppercase hex.
    pub fn id_hex(&self) -> String {
        bytes_to_hex(&self.id)
    }

    /// First text record that carries a signed payload.
    pub fn signed_text(&self) -> Option<&str> {
        self.ndef_records
            .iter()
            .filter(|r| r.record.is_text())
            .filter_map(|r| r.content.as_text())
            .find(|text| SignedPayload::is_signed(text))
    }
}

/// Outcome of a completed read.
#[derive(Debug, Clone)]
pub struct AccessReport {
    pub tag: TagData,
    /// Present when the tag carried a signed payload.
    pub signature: Option<Verification>,
    /// Signature findings followed by behavioral findings.
    pub events: Vec<SecurityEvent>,
    pub access_granted: bool,
    pub denials: Vec<DenialReason>,
    pub security_level: SecurityLevel,
    pub duration_ms: u64,
}

/// Outcome of a completed signed write.
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub tag_id: String,
    pub payload: SignedPayload,
    pub bytes_written: usize,
    pub duration_ms: u64,
}

pub struct TagAccessOrchestrator<T: HardwareTransceiver> {
    transceiver: T,
    config: SecurityConfig,
    signatures: SignatureService,
    fingerprints: FingerprintService,
    secret: SigningSecret,
    detector: Mutex<ThreatDetector>,
    store: Arc<dyn KeyValueStore>,
    log: SecurityLog,
    busy: AtomicBool,
    state: Mutex<OperationState>,
    cancel_requested: AtomicBool,
    cancel_notify: Notify,
}

impl<T: HardwareTransceiver> TagAccessOrchestrator<T> {
    /// Create an orchestrator, restoring access patterns from `store`.
    pub fn new(
        transceiver: T,
        store: Arc<dyn KeyValueStore>,
        secret: SigningSecret,
        config: SecurityConfig,
    ) -> Self {
        let patterns = load_patterns(store.as_ref(), &config);
        let detector = ThreatDetector::with_patterns(config.detector.clone(), patterns);
        Self {
            transceiver,
            signatures: SignatureService::new(config.expiry_window, config.payload_capacity),
            fingerprints: FingerprintService::new(DeviceInfo::detect()),
            secret,
            detector: Mutex::new(detector),
            log: SecurityLog::new(store.clone()),
            store,
            config,
            busy: AtomicBool::new(false),
            state: Mutex::new(OperationState::Idle),
            cancel_requested: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    /// Fingerprint accesses as a specific device instead of this host.
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.fingerprints = FingerprintService::new(device);
        self
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn security_log(&self) -> &SecurityLog {
        &self.log
    }

    pub fn is_supported(&self) -> bool {
        self.transceiver.is_supported()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// This device's fingerprint for today.
    pub fn device_fingerprint(&self) -> String {
        self.fingerprints.fingerprint()
    }

    /// Ask the in-flight operation to stop at its next hardware call.
    ///
    /// Returns false when nothing is in flight.
    pub fn cancel(&self) -> bool {
        if !self.is_busy() {
            return false;
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
        log::info!("NFC operation cancel requested");
        true
    }

    /// Read the tag in the field as this device.
    pub async fn read_tag(&self, location: Option<&str>) -> Result<AccessReport, AccessError> {
        let device = self.fingerprints.fingerprint();
        self.read_tag_as(location, &device).await
    }

    /// Read the tag in the field, attributing the access to `device_fingerprint`.
    pub async fn read_tag_as(
        &self,
        location: Option<&str>,
        device_fingerprint: &str,
    ) -> Result<AccessReport, AccessError> {
        let _busy = self.begin()?;
        let started = Instant::now();

        let raw = {
            let handle = self.acquire().await?;
            self.cancellable(self.transceiver.read_raw_tag(handle.handle))
                .await??
        };

        let now = now_ms();
        self.set_state(OperationState::Decoding);
        let has_ndef_data = !raw.ndef_bytes.is_empty();
        let tag = TagData {
            ndef_records: ndef::decode(&raw.ndef_bytes),
            id: raw.id,
            tech_types: raw.tech_types,
            max_size: raw.max_size,
            is_writable: raw.is_writable,
            timestamp: now,
        };
        let tag_id = tag.id_hex();

        let signature = match tag.signed_text() {
            Some(wire) => {
                self.set_state(OperationState::Verifying);
                let mut verification = self.signatures.verify_at(wire, &self.secret, now);
                for event in verification.events.iter_mut() {
                    event.tag_id = Some(tag_id.clone());
                }
                Some(verification)
            }
            None => None,
        };

        self.set_state(OperationState::AnalyzingBehavior);
        let behavior = self.analyze(&tag_id, location, device_fingerprint, now);

        self.set_state(OperationState::Decided);
        let mut denials = Vec::new();
        if let Some(verification) = &signature {
            if !verification.is_valid {
                denials.push(DenialReason::SignatureInvalid);
            }
            if verification.is_expired {
                denials.push(DenialReason::SignatureExpired);
            }
        }
        let blocking: Vec<SecurityEvent> = behavior.iter().filter(|e| e.blocked).cloned().collect();
        if !blocking.is_empty() {
            denials.push(DenialReason::ThreatBlocked(blocking));
        }
        let access_granted = denials.is_empty();

        let mut events = signature
            .as_ref()
            .map(|v| v.events.clone())
            .unwrap_or_default();
        events.extend(behavior);

        let security_level = security_level(access_granted, signature.is_some(), &events);
        let duration_ms = started.elapsed().as_millis() as u64;

        self.persist_outcome(
            AccessLogEntry {
                tag_id: tag_id.clone(),
                timestamp: now,
                tech_types: tag.tech_types.clone(),
                has_ndef_data,
                read_duration_ms: duration_ms,
                security_level,
                threat_detected: !events.is_empty(),
            },
            &events,
        );

        if access_granted {
            log::info!("Access to tag {} granted ({:?})", tag_id, security_level);
        } else {
            let reasons: Vec<String> = denials.iter().map(|d| d.to_string()).collect();
            log::info!("Access to tag {} denied: {}", tag_id, reasons.join("; "));
        }

        Ok(AccessReport {
            tag,
            signature,
            events,
            access_granted,
            denials,
            security_level,
            duration_ms,
        })
    }

    /// Sign `data` and write it to the tag in the field as a text record.
    pub async fn write_signed(&self, data: &str) -> Result<WriteReport, AccessError> {
        let _busy = self.begin()?;
        let started = Instant::now();

        self.set_state(OperationState::Signing);
        let device = self.fingerprints.fingerprint();
        let payload = self.signatures.sign(data, &self.secret, &device)?;
        let bytes = ndef::encode(&[NdefRecord::text(&payload.to_wire(), DEFAULT_LANGUAGE)?])?;

        let (raw, declined) = {
            let handle = self.acquire().await?;
            let raw = self
                .cancellable(self.transceiver.read_raw_tag(handle.handle))
                .await??;
            let declined = if !raw.is_writable {
                Some(AccessError::TagNotWritable)
            } else if bytes.len() > raw.max_size {
                Some(AccessError::CapacityExceeded {
                    len: bytes.len(),
                    max: raw.max_size,
                })
            } else {
                None
            };
            if declined.is_none() {
                self.set_state(OperationState::Writing);
                self.cancellable(self.transceiver.write_raw_tag(handle.handle, &bytes))
                    .await??;
            }
            (raw, declined)
        };

        self.set_state(OperationState::Decided);
        let tag_id = bytes_to_hex(&raw.id);
        let duration_ms = started.elapsed().as_millis() as u64;
        // A tag that refuses the write still counts as an access attempt
        let (has_ndef_data, security_level) = match &declined {
            Some(_) => (!raw.ndef_bytes.is_empty(), SecurityLevel::Blocked),
            None => (true, SecurityLevel::Verified),
        };
        self.persist_outcome(
            AccessLogEntry {
                tag_id: tag_id.clone(),
                timestamp: now_ms(),
                tech_types: raw.tech_types,
                has_ndef_data,
                read_duration_ms: duration_ms,
                security_level,
                threat_detected: false,
            },
            &[],
        );
        if let Some(err) = declined {
            log::warn!("Write to tag {} declined: {}", tag_id, err);
            return Err(err);
        }
        log::info!("Wrote signed payload ({} bytes) to tag {}", bytes.len(), tag_id);

        Ok(WriteReport {
            tag_id,
            payload,
            bytes_written: bytes.len(),
            duration_ms,
        })
    }

    fn begin(&self) -> Result<BusyGuard<'_>, AccessError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AccessError::OperationInProgress);
        }
        let guard = BusyGuard {
            busy: &self.busy,
            state: &self.state,
        };
        self.cancel_requested.store(false, Ordering::SeqCst);

        if !self.transceiver.is_supported() {
            return Err(AccessError::HardwareUnavailable);
        }
        Ok(guard)
    }

    /// Acquire a tag session, bounded by the configured timeout.
    async fn acquire(&self) -> Result<HandleGuard<'_, T>, AccessError> {
        self.set_state(OperationState::AcquiringHardware);
        let acquire = tokio::time::timeout(
            self.config.acquire_timeout,
            self.transceiver.acquire(TechHint::Ndef),
        );
        let handle = match self.cancellable(acquire).await? {
            Ok(result) => result?,
            Err(_) => {
                log::warn!(
                    "No tag acquired within {}s",
                    self.config.acquire_timeout.as_secs_f32()
                );
                return Err(AccessError::AcquireTimeout);
            }
        };
        self.set_state(OperationState::TagDetected);
        Ok(HandleGuard {
            transceiver: &self.transceiver,
            handle,
        })
    }

    /// Run `fut` unless the operation is cancelled first.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, AccessError> {
        let notified = self.cancel_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.cancel_requested.load(Ordering::SeqCst) {
            return Err(AccessError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = &mut notified => Err(AccessError::Cancelled),
            output = fut => Ok(output),
        }
    }

    /// Record the access, analyze the window and persist patterns.
    fn analyze(
        &self,
        tag_id: &str,
        location: Option<&str>,
        device_fingerprint: &str,
        now: u64,
    ) -> Vec<SecurityEvent> {
        let mut detector = self.detector.lock().unwrap_or_else(PoisonError::into_inner);
        detector.record_access_at(tag_id, location, device_fingerprint, now);
        let events = detector.analyze_at(tag_id, now);

        match detector.patterns().to_json() {
            Ok(bytes) => {
                if let Err(e) = self.store.set(ACCESS_PATTERNS_KEY, &bytes) {
                    log::warn!("Failed to persist access patterns: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to serialize access patterns: {}", e),
        }
        events
    }

    fn persist_outcome(&self, entry: AccessLogEntry, events: &[SecurityEvent]) {
        if let Err(e) = self.log.record_access(entry) {
            log::warn!("Failed to record access log entry: {}", e);
        }
        for event in events {
            if let Err(e) = self.log.record_threat(ThreatReport::from(event)) {
                log::warn!("Failed to record threat report: {}", e);
            }
        }
    }

    fn set_state(&self, next: OperationState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        log::debug!("NFC operation: {} -> {}", state.label(), next.label());
        *state = next;
    }
}

/// Clears the busy flag and returns to `Idle` when the operation ends.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
    state: &'a Mutex<OperationState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = OperationState::Idle;
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Releases the tag session on every exit path.
struct HandleGuard<'a, T: HardwareTransceiver> {
    transceiver: &'a T,
    handle: TagHandle,
}

impl<T: HardwareTransceiver> Drop for HandleGuard<'_, T> {
    fn drop(&mut self) {
        self.transceiver.release(self.handle);
    }
}

fn security_level(granted: bool, signed: bool, events: &[SecurityEvent]) -> SecurityLevel {
    if !granted {
        SecurityLevel::Blocked
    } else if !events.is_empty() {
        SecurityLevel::Suspicious
    } else if signed {
        SecurityLevel::Verified
    } else {
        SecurityLevel::Unsigned
    }
}

/// Restore persisted patterns; anything unreadable starts fresh.
fn load_patterns(store: &dyn KeyValueStore, config: &SecurityConfig) -> PatternStore {
    let window = config.detector.window;
    let max_tags = config.detector.max_tracked_tags;
    match store.get(ACCESS_PATTERNS_KEY) {
        Ok(Some(bytes)) => match PatternStore::from_json(&bytes, window, max_tags) {
            Ok(patterns) => {
                log::info!("Restored access patterns for {} tags", patterns.len());
                patterns
            }
            Err(e) => {
                log::warn!("Discarding unreadable access patterns: {}", e);
                PatternStore::new(window, max_tags)
            }
        },
        Ok(None) => PatternStore::new(window, max_tags),
        Err(e) => {
            log::warn!("Failed to load access patterns: {}", e);
            PatternStore::new(window, max_tags)
        }
    }
}

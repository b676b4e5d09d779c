//! Access log and threat report persistence.
//!
//! Both are JSON lists stored newest-first under fixed keys. Inserting
//! pushes at the head and truncates the tail past the cap.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{KeyValueStore, StoreError};
use crate::crypto::utils::random_base36;
use crate::security::{SecurityEvent, Severity, ThreatType};

pub const ACCESS_LOGS_KEY: &str = "nfc_access_logs";
pub const MAX_ACCESS_LOGS: usize = 100;

pub const THREAT_REPORTS_KEY: &str = "threat_reports";
pub const MAX_THREAT_REPORTS: usize = 50;

/// Overall outcome of an access, as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Signed, valid, fresh and no events.
    Verified,
    /// No signature and no events.
    Unsigned,
    /// Granted, but with non-blocking events.
    Suspicious,
    /// Access denied.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub tag_id: String,
    /// Unix ms.
    pub timestamp: u64,
    pub tech_types: Vec<String>,
    pub has_ndef_data: bool,
    pub read_duration_ms: u64,
    pub security_level: SecurityLevel,
    pub threat_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatReport {
    pub id: String,
    /// Unix ms.
    pub timestamp: u64,
    pub threat_type: ThreatType,
    pub severity: Severity,
    pub description: String,
    pub tag_id: Option<String>,
    pub blocked: bool,
}

impl From<&SecurityEvent> for ThreatReport {
    fn from(event: &SecurityEvent) -> Self {
        Self {
            id: format!("threat_{}_{}", event.timestamp, random_base36(6)),
            timestamp: event.timestamp,
            threat_type: event.threat_type,
            severity: event.severity,
            description: event.description.clone(),
            tag_id: event.tag_id.clone(),
            blocked: event.blocked,
        }
    }
}

/// Summary counts over the persisted lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total_accesses: usize,
    pub accesses_with_threats: usize,
    pub blocked_accesses: usize,
    pub threat_reports: usize,
    pub high_severity_threats: usize,
    pub last_access: Option<u64>,
}

/// Bounded, newest-first logs over a `KeyValueStore`.
#[derive(Clone)]
pub struct SecurityLog {
    store: Arc<dyn KeyValueStore>,
}

impl SecurityLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn record_access(&self, entry: AccessLogEntry) -> Result<(), StoreError> {
        self.push_bounded(ACCESS_LOGS_KEY, entry, MAX_ACCESS_LOGS)
    }

    pub fn record_threat(&self, report: ThreatReport) -> Result<(), StoreError> {
        self.push_bounded(THREAT_REPORTS_KEY, report, MAX_THREAT_REPORTS)
    }

    /// Access log entries, newest first.
    pub fn access_logs(&self) -> Result<Vec<AccessLogEntry>, StoreError> {
        self.load_list(ACCESS_LOGS_KEY)
    }

    /// Threat reports, newest first.
    pub fn threat_reports(&self) -> Result<Vec<ThreatReport>, StoreError> {
        self.load_list(THREAT_REPORTS_KEY)
    }

    pub fn stats(&self) -> Result<LogStats, StoreError> {
        let logs = self.access_logs()?;
        let reports = self.threat_reports()?;
        Ok(LogStats {
            total_accesses: logs.len(),
            accesses_with_threats: logs.iter().filter(|l| l.threat_detected).count(),
            blocked_accesses: logs
                .iter()
                .filter(|l| l.security_level == SecurityLevel::Blocked)
                .count(),
            threat_reports: reports.len(),
            high_severity_threats: reports
                .iter()
                .filter(|r| r.severity == Severity::High)
                .count(),
            last_access: logs.first().map(|l| l.timestamp),
        })
    }

    /// Delete both lists.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(ACCESS_LOGS_KEY)?;
        self.store.delete(THREAT_REPORTS_KEY)?;
        log::info!("Security logs cleared");
        Ok(())
    }

    fn push_bounded<T>(&self, key: &str, item: T, cap: usize) -> Result<(), StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut list: Vec<T> = self.load_list(key)?;
        list.insert(0, item);
        list.truncate(cap);
        let bytes = serde_json::to_vec(&list)?;
        self.store.set(key, &bytes)
    }

    /// Load a list; an unreadable list is logged and treated as empty so a
    /// corrupt entry cannot wedge logging.
    fn load_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_slice(&bytes) {
            Ok(list) => Ok(list),
            Err(e) => {
                log::warn!("Discarding unreadable {} list: {}", key, e);
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn log() -> SecurityLog {
        SecurityLog::new(Arc::new(MemoryStore::new()))
    }

    fn entry(timestamp: u64) -> AccessLogEntry {
        AccessLogEntry {
            tag_id: "04A1B2C3".to_string(),
            timestamp,
            tech_types: vec!["NfcA".to_string(), "Ndef".to_string()],
            has_ndef_data: true,
            read_duration_ms: 42,
            security_level: SecurityLevel::Unsigned,
            threat_detected: false,
        }
    }

    fn event(timestamp: u64, severity: Severity) -> SecurityEvent {
        SecurityEvent::new(ThreatType::RapidAccess, severity, "burst", timestamp, true)
            .with_tag_id("04A1B2C3")
    }

    #[test]
    fn test_access_log_eviction() {
        let log = log();
        for i in 0..105u64 {
            log.record_access(entry(i)).unwrap();
        }

        let logs = log.access_logs().unwrap();
        assert_eq!(logs.len(), MAX_ACCESS_LOGS);
        // Newest first, oldest 5 (0..=4) evicted
        assert_eq!(logs.first().unwrap().timestamp, 104);
        assert_eq!(logs.last().unwrap().timestamp, 5);
        assert!(logs.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }

    #[test]
    fn test_threat_report_eviction() {
        let log = log();
        for i in 0..60u64 {
            log.record_threat(ThreatReport::from(&event(i, Severity::High)))
                .unwrap();
        }
        let reports = log.threat_reports().unwrap();
        assert_eq!(reports.len(), MAX_THREAT_REPORTS);
        assert_eq!(reports[0].timestamp, 59);
        assert_eq!(reports[49].timestamp, 10);
    }

    #[test]
    fn test_threat_report_from_event() {
        let report = ThreatReport::from(&event(1700000000000, Severity::Medium));
        assert!(report.id.starts_with("threat_1700000000000_"));
        assert_eq!(report.threat_type, ThreatType::RapidAccess);
        assert_eq!(report.tag_id.as_deref(), Some("04A1B2C3"));
        assert!(report.blocked);
    }

    #[test]
    fn test_access_log_serialization() {
        let json = serde_json::to_string(&entry(1700000000000)).unwrap();
        assert!(json.contains("\"tagId\":\"04A1B2C3\""));
        assert!(json.contains("\"techTypes\":[\"NfcA\",\"Ndef\"]"));
        assert!(json.contains("\"hasNdefData\":true"));
        assert!(json.contains("\"readDurationMs\":42"));
        assert!(json.contains("\"securityLevel\":\"unsigned\""));
        assert!(json.contains("\"threatDetected\":false"));
    }

    #[test]
    fn test_threat_report_serialization() {
        let json = serde_json::to_string(&ThreatReport::from(&event(5, Severity::High))).unwrap();
        assert!(json.contains("\"threatType\":\"RAPID_ACCESS\""));
        assert!(json.contains("\"severity\":\"HIGH\""));
    }

    #[test]
    fn test_stats() {
        let log = log();
        log.record_access(entry(1)).unwrap();
        log.record_access(AccessLogEntry {
            security_level: SecurityLevel::Blocked,
            threat_detected: true,
            ..entry(2)
        })
        .unwrap();
        log.record_threat(ThreatReport::from(&event(2, Severity::High))).unwrap();
        log.record_threat(ThreatReport::from(&event(2, Severity::Low))).unwrap();

        let stats = log.stats().unwrap();
        assert_eq!(stats.total_accesses, 2);
        assert_eq!(stats.accesses_with_threats, 1);
        assert_eq!(stats.blocked_accesses, 1);
        assert_eq!(stats.threat_reports, 2);
        assert_eq!(stats.high_severity_threats, 1);
        assert_eq!(stats.last_access, Some(2));
    }

    #[test]
    fn test_clear() {
        let log = log();
        log.record_access(entry(1)).unwrap();
        log.record_threat(ThreatReport::from(&event(1, Severity::High))).unwrap();
        log.clear().unwrap();
        assert!(log.access_logs().unwrap().is_empty());
        assert!(log.threat_reports().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_list_is_treated_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_LOGS_KEY, b"not json").unwrap();
        let log = SecurityLog::new(store);
        assert!(log.access_logs().unwrap().is_empty());
        log.record_access(entry(7)).unwrap();
        assert_eq!(log.access_logs().unwrap().len(), 1);
    }
}

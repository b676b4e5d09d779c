//! Security event types shared by the signature service and threat detector.
//!
//! Serialized in the same SCREAMING_SNAKE_CASE form that threat reports use.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatType {
    SignatureInvalid,
    ExpiredSignature,
    RapidAccess,
    LocationAnomaly,
    DeviceAnomaly,
    UnusualTime,
}

impl ThreatType {
    pub fn label(&self) -> &'static str {
        match self {
            ThreatType::SignatureInvalid => "SIGNATURE_INVALID",
            ThreatType::ExpiredSignature => "EXPIRED_SIGNATURE",
            ThreatType::RapidAccess => "RAPID_ACCESS",
            ThreatType::LocationAnomaly => "LOCATION_ANOMALY",
            ThreatType::DeviceAnomaly => "DEVICE_ANOMALY",
            ThreatType::UnusualTime => "UNUSUAL_TIME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single security finding. Immutable once handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub threat_type: ThreatType,
    pub severity: Severity,
    pub description: String,
    pub tag_id: Option<String>,
    /// Unix ms.
    pub timestamp: u64,
    /// Whether this event alone is enough to deny access.
    pub blocked: bool,
}

impl SecurityEvent {
    pub fn new(
        threat_type: ThreatType,
        severity: Severity,
        description: impl Into<String>,
        timestamp: u64,
        blocked: bool,
    ) -> Self {
        Self {
            threat_type,
            severity,
            description: description.into(),
            tag_id: None,
            timestamp,
            blocked,
        }
    }

    /// Attach the tag id the event concerns.
    pub fn with_tag_id(mut self, tag_id: impl Into<String>) -> Self {
        self.tag_id = Some(tag_id.into());
        self
    }
}

impl std::fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:?}] {}: {}{}",
            self.severity,
            self.threat_type.label(),
            self.description,
            if self.blocked { " (blocked)" } else { "" }
        )
    }
}

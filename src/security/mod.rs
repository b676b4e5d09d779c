//! Security events, per-tag access patterns and behavioral threat detection.

pub mod detector;
pub mod pattern;
pub mod types;

pub use detector::{threat_types, DetectorConfig, ThreatDetector};
pub use pattern::{AccessPattern, PatternStore};
pub use types::{SecurityEvent, Severity, ThreatType};

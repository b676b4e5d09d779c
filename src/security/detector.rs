//! Behavioral threat detection over per-tag access windows.
//!
//! Every rule is evaluated on every analysis and all firing rules are
//! reported. An access should be denied when any returned event is blocking.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, Offset, Timelike, Utc};

use super::pattern::{PatternStore, MAX_TRACKED_TAGS, PATTERN_WINDOW};
use super::types::{SecurityEvent, Severity, ThreatType};
use crate::crypto::utils::now_ms;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Thresholds for the behavioral rules.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// More accesses than this within 60s is rapid access.
    pub max_accesses_per_minute: usize,
    /// More distinct locations than this in the location lookback is anomalous.
    pub max_locations_per_hour: usize,
    /// More distinct devices than this in the device lookback is anomalous.
    pub max_devices: usize,
    /// Intervals shorter than this count toward a burst.
    pub burst_interval: Duration,
    /// More short intervals than this is a burst.
    pub max_short_intervals: usize,
    pub location_lookback: usize,
    pub device_lookback: usize,
    /// Quiet hours are `[quiet_start_hour, 24)` and `[0, quiet_end_hour)`.
    pub quiet_start_hour: u32,
    pub quiet_end_hour: u32,
    /// A quiet-hour access is novel if no past access is within this many hours.
    pub novelty_hours: u32,
    /// Offset used to derive the local hour of day.
    pub utc_offset: FixedOffset,
    /// Accesses kept per tag.
    pub window: usize,
    /// Tags tracked at once.
    pub max_tracked_tags: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_accesses_per_minute: 3,
            max_locations_per_hour: 2,
            max_devices: 2,
            burst_interval: Duration::from_secs(5),
            max_short_intervals: 2,
            location_lookback: 10,
            device_lookback: 5,
            quiet_start_hour: 22,
            quiet_end_hour: 6,
            novelty_hours: 2,
            utc_offset: Local::now().offset().fix(),
            window: PATTERN_WINDOW,
            max_tracked_tags: MAX_TRACKED_TAGS,
        }
    }
}

/// Owns the access patterns and classifies anomalies in them.
pub struct ThreatDetector {
    config: DetectorConfig,
    patterns: PatternStore,
}

impl ThreatDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let patterns = PatternStore::new(config.window, config.max_tracked_tags);
        Self { config, patterns }
    }

    /// Create a detector over previously persisted patterns.
    pub fn with_patterns(config: DetectorConfig, patterns: PatternStore) -> Self {
        Self { config, patterns }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// Record an access at the current time.
    pub fn record_access(&mut self, tag_id: &str, location: Option<&str>, device_fingerprint: &str) {
        self.record_access_at(tag_id, location, device_fingerprint, now_ms());
    }

    pub fn record_access_at(
        &mut self,
        tag_id: &str,
        location: Option<&str>,
        device_fingerprint: &str,
        at: u64,
    ) {
        let location = location.filter(|l| !l.is_empty());
        let pattern = self.patterns.record(tag_id, at, location, device_fingerprint);
        log::debug!("Recorded access to tag {} ({} in window)", tag_id, pattern.len());
    }

    /// Analyze the tag's current window at the current time.
    pub fn analyze(&self, tag_id: &str) -> Vec<SecurityEvent> {
        self.analyze_at(tag_id, now_ms())
    }

    /// Analyze the tag's current window as of `now`. The newest recorded
    /// access is treated as the access being analyzed.
    pub fn analyze_at(&self, tag_id: &str, now: u64) -> Vec<SecurityEvent> {
        let Some(pattern) = self.patterns.get(tag_id) else {
            return Vec::new();
        };
        let cfg = &self.config;
        let mut events = Vec::new();
        let event = |threat_type, severity, description: String, blocked| {
            SecurityEvent::new(threat_type, severity, description, now, blocked).with_tag_id(tag_id)
        };

        let rate_window_ms = RATE_WINDOW.as_millis() as u64;
        let recent = pattern
            .times()
            .iter()
            .filter(|t| now.saturating_sub(**t) < rate_window_ms)
            .count();
        if recent > cfg.max_accesses_per_minute {
            events.push(event(
                ThreatType::RapidAccess,
                Severity::High,
                format!(
                    "{} accesses within 60s (limit {})",
                    recent, cfg.max_accesses_per_minute
                ),
                true,
            ));
        }

        let burst_ms = cfg.burst_interval.as_millis() as u64;
        let short_intervals = pattern.intervals().iter().filter(|i| **i < burst_ms).count();
        if short_intervals > cfg.max_short_intervals {
            events.push(event(
                ThreatType::RapidAccess,
                Severity::High,
                format!(
                    "{} reads within {}s of the previous read (limit {})",
                    short_intervals,
                    cfg.burst_interval.as_secs(),
                    cfg.max_short_intervals
                ),
                true,
            ));
        }

        let locations = pattern.distinct_recent_locations(cfg.location_lookback);
        if locations > cfg.max_locations_per_hour {
            events.push(event(
                ThreatType::LocationAnomaly,
                Severity::Medium,
                format!(
                    "{} distinct locations in the last {} accesses (limit {})",
                    locations, cfg.location_lookback, cfg.max_locations_per_hour
                ),
                false,
            ));
        }

        let devices = pattern.distinct_recent_devices(cfg.device_lookback);
        if devices > cfg.max_devices {
            events.push(event(
                ThreatType::DeviceAnomaly,
                Severity::High,
                format!(
                    "{} distinct devices in the last {} accesses (limit {})",
                    devices, cfg.device_lookback, cfg.max_devices
                ),
                true,
            ));
        }

        if let Some(hour) = self.local_hour(now) {
            if self.is_quiet_hour(hour) {
                // History excludes the access under analysis
                let history = pattern.times().len().saturating_sub(1);
                let seen_nearby = pattern
                    .times()
                    .iter()
                    .take(history)
                    .filter_map(|t| self.local_hour(*t))
                    .any(|h| hour_distance(h, hour) <= cfg.novelty_hours);
                if !seen_nearby {
                    events.push(event(
                        ThreatType::UnusualTime,
                        Severity::Low,
                        format!(
                            "Access at {:02}:00 with no prior access to this tag within {}h of that time",
                            hour, cfg.novelty_hours
                        ),
                        false,
                    ));
                }
            }
        }

        for e in events.iter().filter(|e| e.blocked) {
            log::warn!("Tag {}: {}", tag_id, e);
        }
        events
    }

    /// Forget the history of one tag.
    pub fn reset(&mut self, tag_id: &str) {
        self.patterns.remove(tag_id);
    }

    fn local_hour(&self, at: u64) -> Option<u32> {
        DateTime::<Utc>::from_timestamp_millis(at as i64)
            .map(|dt| dt.with_timezone(&self.config.utc_offset).hour())
    }

    fn is_quiet_hour(&self, hour: u32) -> bool {
        hour >= self.config.quiet_start_hour || hour < self.config.quiet_end_hour
    }
}

/// Distance between two hours of the day, wrapping at midnight.
fn hour_distance(a: u32, b: u32) -> u32 {
    let d = a.abs_diff(b) % 24;
    d.min(24 - d)
}

/// Distinct threat types among events, in first-seen order.
pub fn threat_types(events: &[SecurityEvent]) -> Vec<ThreatType> {
    let mut seen = HashSet::new();
    events
        .iter()
        .map(|e| e.threat_type)
        .filter(|t| seen.insert(*t))
        .collect()
}

//! Bounded per-tag access history.
//!
//! Each `AccessPattern` keeps four parallel sequences (times, locations,
//! devices, intervals) capped at the window size, trimmed together so index
//! `i` always refers to the same access. `PatternStore` caps the number of
//! tracked tags, evicting the tag accessed least recently.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Default number of accesses kept per tag.
pub const PATTERN_WINDOW: usize = 20;

/// Default number of distinct tags tracked at once.
pub const MAX_TRACKED_TAGS: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPattern {
    /// Access times, Unix ms, oldest first.
    times: VecDeque<u64>,
    /// Location per access; empty when none was reported.
    locations: VecDeque<String>,
    /// Device fingerprint per access.
    devices: VecDeque<String>,
    /// `intervals[i] = times[i + 1] - times[i]`.
    intervals: VecDeque<u64>,
}

impl AccessPattern {
    /// Append an access and trim to `window` entries.
    pub fn record(&mut self, at: u64, location: Option<&str>, device: &str, window: usize) {
        if let Some(&last) = self.times.back() {
            self.intervals.push_back(at.saturating_sub(last));
        }
        self.times.push_back(at);
        self.locations.push_back(location.unwrap_or_default().to_string());
        self.devices.push_back(device.to_string());
        self.trim(window);
    }

    fn trim(&mut self, window: usize) {
        while self.times.len() > window {
            self.times.pop_front();
            self.locations.pop_front();
            self.devices.pop_front();
        }
        while self.intervals.len() > self.times.len().saturating_sub(1) {
            self.intervals.pop_front();
        }
    }

    pub fn times(&self) -> &VecDeque<u64> {
        &self.times
    }

    pub fn locations(&self) -> &VecDeque<String> {
        &self.locations
    }

    pub fn devices(&self) -> &VecDeque<String> {
        &self.devices
    }

    pub fn intervals(&self) -> &VecDeque<u64> {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn last_access(&self) -> Option<u64> {
        self.times.back().copied()
    }

    /// Distinct non-empty locations among the last `n` accesses.
    pub fn distinct_recent_locations(&self, n: usize) -> usize {
        self.locations
            .iter()
            .rev()
            .take(n)
            .filter(|l| !l.is_empty())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Distinct device fingerprints among the last `n` accesses.
    pub fn distinct_recent_devices(&self, n: usize) -> usize {
        self.devices.iter().rev().take(n).collect::<HashSet<_>>().len()
    }

    /// Restore the invariants after deserialization.
    ///
    /// Misaligned sequences cannot be repaired and reset the pattern.
    fn normalize(&mut self, window: usize) {
        let n = self.times.len();
        if self.locations.len() != n || self.devices.len() != n {
            log::warn!("Discarding misaligned access pattern ({} entries)", n);
            *self = Self::default();
            return;
        }
        self.intervals = self
            .times
            .iter()
            .zip(self.times.iter().skip(1))
            .map(|(a, b)| b.saturating_sub(*a))
            .collect();
        self.trim(window);
    }
}

/// Access patterns keyed by tag id, bounded in both dimensions.
#[derive(Debug, Clone)]
pub struct PatternStore {
    patterns: HashMap<String, AccessPattern>,
    window: usize,
    max_tags: usize,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(PATTERN_WINDOW, MAX_TRACKED_TAGS)
    }
}

impl PatternStore {
    pub fn new(window: usize, max_tags: usize) -> Self {
        Self {
            patterns: HashMap::new(),
            window: window.max(1),
            max_tags: max_tags.max(1),
        }
    }

    /// Record an access, evicting the least recently accessed tag if a new
    /// tag would exceed the cap.
    pub fn record(
        &mut self,
        tag_id: &str,
        at: u64,
        location: Option<&str>,
        device: &str,
    ) -> &AccessPattern {
        if !self.patterns.contains_key(tag_id) {
            while self.patterns.len() >= self.max_tags {
                self.evict_lru();
            }
        }

        let window = self.window;
        let pattern = self.patterns.entry(tag_id.to_string()).or_default();
        pattern.record(at, location, device, window);
        pattern
    }

    /// Evict the tag whose last access is oldest.
    fn evict_lru(&mut self) {
        if let Some(oldest) = self
            .patterns
            .iter()
            .min_by_key(|(_, p)| p.last_access().unwrap_or(0))
            .map(|(k, _)| k.clone())
        {
            log::debug!("Evicting access pattern for tag {}", oldest);
            self.patterns.remove(&oldest);
        }
    }

    pub fn get(&self, tag_id: &str) -> Option<&AccessPattern> {
        self.patterns.get(tag_id)
    }

    pub fn remove(&mut self, tag_id: &str) -> Option<AccessPattern> {
        self.patterns.remove(tag_id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    /// Serialize all patterns as a JSON object keyed by tag id.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.patterns)
    }

    /// Load patterns saved by `to_json`, re-applying the window and tag caps.
    pub fn from_json(bytes: &[u8], window: usize, max_tags: usize) -> Result<Self, serde_json::Error> {
        let loaded: HashMap<String, AccessPattern> = serde_json::from_slice(bytes)?;
        let mut store = Self::new(window, max_tags);

        for (tag_id, mut pattern) in loaded {
            pattern.normalize(store.window);
            if !pattern.is_empty() {
                store.patterns.insert(tag_id, pattern);
            }
        }
        while store.patterns.len() > store.max_tags {
            store.evict_lru();
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_sequences_aligned() {
        let mut pattern = AccessPattern::default();
        pattern.record(1_000, Some("lobby"), "dev-a", PATTERN_WINDOW);
        pattern.record(1_500, None, "dev-a", PATTERN_WINDOW);
        pattern.record(4_000, Some("lab"), "dev-b", PATTERN_WINDOW);

        assert_eq!(pattern.times(), &VecDeque::from(vec![1_000, 1_500, 4_000]));
        assert_eq!(pattern.locations(), &VecDeque::from(vec!["lobby".to_string(), String::new(), "lab".to_string()]));
        assert_eq!(pattern.devices().len(), 3);
        assert_eq!(pattern.intervals(), &VecDeque::from(vec![500, 2_500]));
    }

    #[test]
    fn test_bounded_history_evicts_oldest() {
        let mut pattern = AccessPattern::default();
        for i in 0..25u64 {
            pattern.record(i * 1_000, Some(&format!("loc-{}", i)), "dev", PATTERN_WINDOW);
        }

        assert_eq!(pattern.len(), 20);
        let expected: Vec<u64> = (5..25u64).map(|i| i * 1_000).collect();
        assert_eq!(pattern.times().iter().copied().collect::<Vec<_>>(), expected);
        assert_eq!(pattern.locations().front().map(String::as_str), Some("loc-5"));
        assert_eq!(pattern.devices().len(), 20);
        assert_eq!(pattern.intervals().len(), 19);
        assert!(pattern.intervals().iter().all(|i| *i == 1_000));
    }

    #[test]
    fn test_interval_invariant_holds_after_trim() {
        let mut pattern = AccessPattern::default();
        for i in 0..30u64 {
            pattern.record(i * i * 10, None, "dev", 5);
        }
        let times: Vec<u64> = pattern.times().iter().copied().collect();
        for (i, interval) in pattern.intervals().iter().enumerate() {
            assert_eq!(*interval, times[i + 1] - times[i]);
        }
    }

    #[test]
    fn test_distinct_counts() {
        let mut pattern = AccessPattern::default();
        for (loc, dev) in [("a", "d1"), ("", "d2"), ("b", "d1"), ("a", "d3")] {
            let loc = if loc.is_empty() { None } else { Some(loc) };
            pattern.record(0, loc, dev, PATTERN_WINDOW);
        }
        assert_eq!(pattern.distinct_recent_locations(10), 2);
        assert_eq!(pattern.distinct_recent_devices(5), 3);
        assert_eq!(pattern.distinct_recent_devices(2), 2);
    }

    #[test]
    fn test_store_evicts_least_recent_tag() {
        let mut store = PatternStore::new(PATTERN_WINDOW, 2);
        store.record("A", 1_000, None, "dev");
        store.record("B", 2_000, None, "dev");
        store.record("A", 3_000, None, "dev");
        store.record("C", 4_000, None, "dev");

        assert_eq!(store.len(), 2);
        assert!(store.get("A").is_some());
        assert!(store.get("B").is_none(), "B was least recently accessed");
        assert!(store.get("C").is_some());
    }

    #[test]
    fn test_store_json_round_trip() {
        let mut store = PatternStore::default();
        store.record("04A1", 1_000, Some("gate"), "dev-a");
        store.record("04A1", 2_000, None, "dev-b");

        let json = store.to_json().unwrap();
        let restored = PatternStore::from_json(&json, PATTERN_WINDOW, MAX_TRACKED_TAGS).unwrap();
        assert_eq!(restored.get("04A1"), store.get("04A1"));
    }

    #[test]
    fn test_from_json_reapplies_window() {
        let mut store = PatternStore::new(50, 10);
        for i in 0..30u64 {
            store.record("tag", i, None, "dev");
        }
        let json = store.to_json().unwrap();
        let restored = PatternStore::from_json(&json, 20, 10).unwrap();
        let pattern = restored.get("tag").unwrap();
        assert_eq!(pattern.len(), 20);
        assert_eq!(pattern.times().front(), Some(&10));
        assert_eq!(pattern.intervals().len(), 19);
    }

    #[test]
    fn test_from_json_discards_misaligned_pattern() {
        let json = br#"{"bad":{"times":[1,2],"locations":[""],"devices":["d","d"],"intervals":[1]}}"#;
        let restored = PatternStore::from_json(json, PATTERN_WINDOW, MAX_TRACKED_TAGS).unwrap();
        assert!(restored.get("bad").is_none());
    }
}

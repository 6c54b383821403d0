//! Feed health: consecutive-failure counters with auto-disable.
//!
//! A source whose counter reaches `max_failures` is no longer fetched. There is
//! no automatic recovery; the counter only goes back down when the persisted
//! `feed_health.json` is edited or removed out of band.

use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_MAX_FEED_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct HealthTracker {
    failures: HashMap<String, u32>,
    max_failures: u32,
}

impl HealthTracker {
    pub fn new(max_failures: u32) -> Self {
        Self::from_counts(HashMap::new(), max_failures)
    }

    /// Rebuild a tracker from persisted counts.
    pub fn from_counts(failures: HashMap<String, u32>, max_failures: u32) -> Self {
        let max_failures = if max_failures == 0 {
            DEFAULT_MAX_FEED_FAILURES
        } else {
            max_failures
        };
        Self {
            failures,
            max_failures,
        }
    }

    /// Unknown sources count as zero failures.
    pub fn is_eligible(&self, source: &str) -> bool {
        self.failures(source) < self.max_failures
    }

    pub fn record_failure(&mut self, source: &str) {
        let n = self.failures.entry(source.to_string()).or_insert(0);
        *n = n.saturating_add(1);
    }

    /// Failures only ever accumulate, so a successful fetch leaves the counter alone.
    pub fn record_success(&mut self, _source: &str) {}

    pub fn failures(&self, source: &str) -> u32 {
        self.failures.get(source).copied().unwrap_or(0)
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Sources currently at or over the threshold, sorted.
    pub fn disabled_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .failures
            .iter()
            .filter(|(_, &n)| n >= self.max_failures)
            .map(|(s, _)| s.clone())
            .collect();
        out.sort();
        out
    }

    /// Sorted copy of the counters for persistence.
    pub fn snapshot(&self) -> BTreeMap<String, u32> {
        self.failures
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEED_FAILURES)
    }
}

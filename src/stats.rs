//! Hit/miss statistics.
//!
//! Counters and the running average live in a stats namespace of the same
//! expiring-map abstraction the indexed store uses, with a long TTL so stats
//! persist across page-cache churn.

use time::Duration;

use crate::config::CacheSettings;
use crate::store::ExpiringMap;

const HITS: &str = "hits";
const MISSES: &str = "misses";
const AVG: &str = "avg";

pub struct StatsTracker {
    slots: ExpiringMap<&'static str, f64>,
    ttl: Duration,
}

impl StatsTracker {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            slots: ExpiringMap::new(),
            ttl: settings.stats_ttl(),
        }
    }

    /// Record a hit and fold the latency sample into the running average.
    ///
    /// The average is a weighted incremental mean computed with the
    /// pre-increment hit count:
    /// `new_avg = (old_avg * old_hits + sample) / (old_hits + 1)`.
    pub fn record_hit(&self, sample_seconds: f64) {
        let hits = self.slots.get(&HITS).unwrap_or(0.0);
        let avg = self.slots.get(&AVG).unwrap_or(0.0);
        let new_avg = (avg * hits + sample_seconds) / (hits + 1.0);
        self.slots.insert(AVG, new_avg, self.ttl);
        self.slots.insert(HITS, hits + 1.0, self.ttl);
    }

    pub fn record_miss(&self) {
        let misses = self.slots.get(&MISSES).unwrap_or(0.0);
        self.slots.insert(MISSES, misses + 1.0, self.ttl);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.slots.get(&HITS).unwrap_or(0.0) as u64,
            misses: self.slots.get(&MISSES).unwrap_or(0.0) as u64,
            avg_seconds: self.slots.get(&AVG).unwrap_or(0.0),
        }
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

/// Point-in-time view of the counters for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub avg_seconds: f64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit percentage; 0 when nothing has been recorded yet.
    pub fn hit_pct(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.hits as f64 / self.total() as f64 * 100.0
        }
    }

    /// Miss percentage; 0 when nothing has been recorded yet.
    pub fn miss_pct(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.misses as f64 / self.total() as f64 * 100.0
        }
    }
}

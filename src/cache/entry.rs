use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Last known analysis result for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Commit id of the default branch when the result was recorded.
    pub commit_fingerprint: String,
    pub had_issues: bool,
    pub result_summary: String,
    /// Wall-clock processing time in seconds.
    pub processing_duration: f64,
    pub recorded_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh means same fingerprint and recorded no longer than `max_age` before `now`.
    pub fn is_fresh_at(&self, fingerprint: &str, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.commit_fingerprint == fingerprint && now - self.recorded_at <= max_age
    }
}

/// Running hit/miss counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub updates: u64,
    /// Estimated seconds saved by hits, based on the average processing duration.
    pub time_saved_secs: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        (self.hits as f64 / total as f64) * 100.0
    }
}

/// On-disk representation of the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub repositories: HashMap<String, CacheEntry>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub statistics: CacheStats,
}

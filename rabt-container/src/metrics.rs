//! Resolution metrics and the spy history.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

/// Aggregated timing for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierMetrics {
    pub id: String,
    pub resolutions: u64,
    pub total_time: Duration,
    pub max_time: Duration,
}

impl IdentifierMetrics {
    pub fn average_time(&self) -> Duration {
        if self.resolutions == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.resolutions as u32
        }
    }
}

/// Snapshot returned by `performance_metrics()`.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_resolutions: u64,
    pub total_time: Duration,
    pub per_identifier: Vec<IdentifierMetrics>,
}

impl PerformanceMetrics {
    pub fn for_identifier(&self, id: &str) -> Option<&IdentifierMetrics> {
        self.per_identifier.iter().find(|m| m.id == id)
    }
}

/// Records per-identifier resolution timings.
pub struct MetricsRecorder {
    inner: Mutex<HashMap<String, IdentifierMetrics>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, id: &str, elapsed: Duration) {
        let mut inner = self.inner.lock();
        let entry = inner
            .entry(id.to_string())
            .or_insert_with(|| IdentifierMetrics {
                id: id.to_string(),
                resolutions: 0,
                total_time: Duration::ZERO,
                max_time: Duration::ZERO,
            });
        entry.resolutions += 1;
        entry.total_time += elapsed;
        entry.max_time = entry.max_time.max(elapsed);
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        let inner = self.inner.lock();
        let mut per_identifier: Vec<IdentifierMetrics> = inner.values().cloned().collect();
        per_identifier.sort_by(|a, b| a.id.cmp(&b.id));
        PerformanceMetrics {
            total_resolutions: per_identifier.iter().map(|m| m.resolutions).sum(),
            total_time: per_identifier.iter().map(|m| m.total_time).sum(),
            per_identifier,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("identifiers", &self.inner.lock().len())
            .finish()
    }
}

/// One recorded resolution of a spied identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRecord {
    pub id: String,
    pub class: String,
}

/// Spy registrations and their recorded history.
pub struct ResolutionHistory {
    spied: RwLock<HashSet<String>>,
    records: Mutex<Vec<ResolutionRecord>>,
}

impl ResolutionHistory {
    pub fn new() -> Self {
        Self {
            spied: RwLock::new(HashSet::new()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Marks `id` so future resolutions are recorded.
    pub fn spy(&self, id: &str) {
        self.spied.write().insert(id.to_string());
    }

    pub fn record_if_spied(&self, id: &str, class: &str) {
        if self.spied.read().contains(id) {
            self.records.lock().push(ResolutionRecord {
                id: id.to_string(),
                class: class.to_string(),
            });
        }
    }

    pub fn history(&self) -> Vec<ResolutionRecord> {
        self.records.lock().clone()
    }
}

impl Default for ResolutionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResolutionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionHistory")
            .field("spied", &self.spied.read().len())
            .field("records", &self.records.lock().len())
            .finish()
    }
}

//! Save metrics
//!
//! Counters for save outcomes, shared by every save issued through one
//! [`DocumentSaver`](crate::DocumentSaver).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SaveMetrics {
    /// Documents written by insert
    pub insert_count: AtomicU64,

    /// Documents written by update
    pub update_count: AtomicU64,

    /// Saves that had nothing to write or found no document
    pub noop_count: AtomicU64,

    /// Updates rejected by the version condition
    pub conflict_count: AtomicU64,

    /// Inserts rejected because the identity exists
    pub duplicate_count: AtomicU64,

    /// Time spent in storage calls (nanoseconds)
    pub total_store_time_ns: AtomicU64,
}

impl SaveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&self) {
        self.insert_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update(&self) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_noop(&self) {
        self.noop_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflict_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_time(&self, duration: Duration) {
        self.total_store_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.insert_count.store(0, Ordering::Relaxed);
        self.update_count.store(0, Ordering::Relaxed);
        self.noop_count.store(0, Ordering::Relaxed);
        self.conflict_count.store(0, Ordering::Relaxed);
        self.duplicate_count.store(0, Ordering::Relaxed);
        self.total_store_time_ns.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> SaveMetricsSnapshot {
        SaveMetricsSnapshot {
            inserts: self.insert_count.load(Ordering::Relaxed),
            updates: self.update_count.load(Ordering::Relaxed),
            noops: self.noop_count.load(Ordering::Relaxed),
            conflicts: self.conflict_count.load(Ordering::Relaxed),
            duplicates: self.duplicate_count.load(Ordering::Relaxed),
            store_time_ns: self.total_store_time_ns.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of save metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveMetricsSnapshot {
    pub inserts: u64,
    pub updates: u64,
    pub noops: u64,
    pub conflicts: u64,
    pub duplicates: u64,
    pub store_time_ns: u64,
}

impl SaveMetricsSnapshot {
    pub fn saves(&self) -> u64 {
        self.inserts + self.updates + self.noops + self.conflicts + self.duplicates
    }

    /// Share of saves rejected by a version conflict (0.0 to 1.0)
    pub fn conflict_rate(&self) -> f64 {
        let saves = self.saves();
        if saves == 0 {
            0.0
        } else {
            self.conflicts as f64 / saves as f64
        }
    }
}

impl std::fmt::Display for SaveMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Saves: {} | Inserts: {} | Updates: {} | No-ops: {}",
            self.saves(),
            self.inserts,
            self.updates,
            self.noops
        )?;
        writeln!(
            f,
            "  Conflicts: {} ({:.1}%) | Duplicates: {}",
            self.conflicts,
            self.conflict_rate() * 100.0,
            self.duplicates
        )?;
        writeln!(
            f,
            "  Store Time: {:.2}ms",
            Duration::from_nanos(self.store_time_ns).as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}

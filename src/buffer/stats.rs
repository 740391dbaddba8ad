//! Buffer pool statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the buffer pool.
///
/// Atomic so the pool can update them through `&self`; `Relaxed` ordering is
/// enough because no counter is used to synchronise anything.
#[derive(Debug, Default)]
pub struct BufferPoolStats {
    /// Fetches served from a resident frame.
    pub cache_hits: AtomicU64,
    /// Fetches that had to read from disk.
    pub cache_misses: AtomicU64,
    /// Frames reclaimed from a resident page.
    pub evictions: AtomicU64,
    /// Pages read from disk.
    pub pages_read: AtomicU64,
    /// Pages written to disk.
    pub pages_written: AtomicU64,
}

impl BufferPoolStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pages_read: self.pages_read.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of buffer pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
}

impl StatsSnapshot {
    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, evictions: {}, hit_rate: {:.2}% }}",
            self.cache_hits,
            self.cache_misses,
            self.evictions,
            self.hit_rate() * 100.0
        )
    }
}

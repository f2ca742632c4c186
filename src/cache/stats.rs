use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::metrics::percentiles::PercentileSet;

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Counters kept by the snapshot cache for diagnostics.
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    refreshes: AtomicU64,
    refresh_errors: AtomicU64,
    stale_served: AtomicU64,
    collect_latency: Mutex<Histogram<u64>>,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Reads answered from a fresh entry
    pub hits: u64,
    /// Reads that found the entry empty or expired
    pub misses: u64,
    /// Misses that joined a refresh already in flight
    pub coalesced: u64,
    pub refreshes: u64,
    pub refresh_errors: u64,
    /// Failed refreshes answered with the previous snapshot
    pub stale_served: u64,
    pub collect_latency: PercentileSet,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            refresh_errors: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            collect_latency: Mutex::new(
                Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                    .expect("static histogram bounds are valid"),
            ),
        }
    }

    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome and duration of one `collect()` call.
    pub fn refreshed(&self, ok: bool, took: Duration) {
        if ok {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.refresh_errors.fetch_add(1, Ordering::Relaxed);
        }
        // Clamp to the histogram range
        let us = u64::try_from(took.as_micros()).unwrap_or(HIST_HIGH);
        let _ = self
            .collect_latency
            .lock()
            .record(us.clamp(HIST_LOW, HIST_HIGH));
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            collect_latency: PercentileSet::from_histogram(&self.collect_latency.lock()),
        }
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

//! Most-recent-snapshot cache in front of a [`MetricsSource`].
//!
//! Reads inside the freshness window are served from memory under a shared
//! lock. The first read after expiry starts a refresh on the blocking pool;
//! concurrent readers that also miss join that same refresh instead of
//! issuing their own `collect()`. If the refresh fails and an older
//! snapshot exists, the older snapshot is served.

pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics::{Category, MetricsSource, Snapshot, SourceError};
use stats::{CacheStats, StatsSnapshot};

pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_millis(100);

type RefreshResult = Result<Arc<Snapshot>, SourceError>;
type Refresh = Shared<BoxFuture<'static, RefreshResult>>;

// ─── Public types ────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The source failed and there is no earlier snapshot to fall back to.
    #[error("no metrics available yet: {source}")]
    NoDataYet {
        #[source]
        source: SourceError,
    },
}

/// Cache state for diagnostics, see [`SnapshotCache::inspect`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(rename = "freshness_window_ms", serialize_with = "as_millis")]
    pub freshness_window: Duration,
    #[serde(rename = "age_ms", serialize_with = "opt_as_millis")]
    pub age: Option<Duration>,
    pub stats: StatsSnapshot,
}

/// Shared handle to the snapshot cache. Clones refer to the same entry.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    source: Arc<dyn MetricsSource>,
    entry: RwLock<CacheEntry>,
    /// Lock order: `in_flight` before `entry`, never the reverse.
    in_flight: Mutex<Option<InFlight>>,
    stats: CacheStats,
}

struct CacheEntry {
    captured: Option<Captured>,
    freshness_window: Duration,
    /// Bumped by `invalidate()`; refreshes started under an older epoch
    /// do not write back.
    epoch: u64,
}

/// A snapshot together with the moment it was produced. Stored and
/// cleared as one value so the two can never disagree.
struct Captured {
    snapshot: Arc<Snapshot>,
    at: Instant,
    wall: DateTime<Utc>,
}

struct InFlight {
    epoch: u64,
    refresh: Refresh,
}

enum Pending {
    /// Another refresh landed while we were queuing for the slot.
    Landed(Arc<Snapshot>),
    Wait(Refresh),
}

// ─── SnapshotCache impl ──────────────────────────────────────────

impl SnapshotCache {
    pub fn new(source: Arc<dyn MetricsSource>, freshness_window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                entry: RwLock::new(CacheEntry {
                    captured: None,
                    freshness_window,
                    epoch: 0,
                }),
                in_flight: Mutex::new(None),
                stats: CacheStats::new(),
            }),
        }
    }

    /// Return the cached snapshot if it is still fresh, otherwise refresh.
    ///
    /// A failed refresh is answered with the previous snapshot regardless
    /// of its age; only when there has never been one does this return
    /// [`CacheError::NoDataYet`].
    pub async fn read(&self) -> Result<Arc<Snapshot>, CacheError> {
        let stale = {
            let entry = self.inner.entry.read();
            if let Some(snapshot) = entry.fresh(Instant::now()) {
                self.inner.stats.hit();
                return Ok(snapshot);
            }
            entry.captured.as_ref().map(|c| c.snapshot.clone())
        };
        self.inner.stats.miss();

        let refresh = match self.pending() {
            Pending::Landed(snapshot) => return Ok(snapshot),
            Pending::Wait(refresh) => refresh,
        };

        match refresh.await {
            Ok(snapshot) => Ok(snapshot),
            Err(source) => match stale {
                Some(snapshot) => {
                    self.inner.stats.stale_served();
                    warn!(
                        category = %source.category,
                        error = %source,
                        "refresh failed, serving stale snapshot"
                    );
                    Ok(snapshot)
                }
                None => Err(CacheError::NoDataYet { source }),
            },
        }
    }

    /// Takes effect on the next `read()`; the stored snapshot is untouched.
    pub fn set_freshness_window(&self, window: Duration) {
        self.inner.entry.write().freshness_window = window;
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        info!(window_ms, "cache freshness window updated");
    }

    /// Drop the stored snapshot so the next `read()` refreshes.
    ///
    /// A refresh already in flight still answers the readers waiting on it,
    /// but its result is not stored.
    pub fn invalidate(&self) {
        let mut slot = self.inner.in_flight.lock();
        let mut entry = self.inner.entry.write();
        entry.captured = None;
        entry.epoch += 1;
        *slot = None;
        debug!(epoch = entry.epoch, "cache invalidated");
    }

    pub fn inspect(&self) -> CacheInfo {
        let entry = self.inner.entry.read();
        CacheInfo {
            captured_at: entry.captured.as_ref().map(|c| c.wall),
            freshness_window: entry.freshness_window,
            age: entry.captured.as_ref().map(|c| c.at.elapsed()),
            stats: self.inner.stats.snapshot(),
        }
    }

    /// Join the refresh in flight, or start one.
    fn pending(&self) -> Pending {
        let mut slot = self.inner.in_flight.lock();
        if let Some(in_flight) = slot.as_ref() {
            self.inner.stats.coalesced();
            return Pending::Wait(in_flight.refresh.clone());
        }

        let epoch = {
            let entry = self.inner.entry.read();
            if let Some(snapshot) = entry.fresh(Instant::now()) {
                return Pending::Landed(snapshot);
            }
            entry.epoch
        };

        let refresh = spawn_refresh(self.inner.clone(), epoch);
        *slot = Some(InFlight {
            epoch,
            refresh: refresh.clone(),
        });
        Pending::Wait(refresh)
    }
}

impl CacheEntry {
    fn fresh(&self, now: Instant) -> Option<Arc<Snapshot>> {
        self.captured
            .as_ref()
            .filter(|c| now.saturating_duration_since(c.at) < self.freshness_window)
            .map(|c| c.snapshot.clone())
    }
}

// ─── Refresh ─────────────────────────────────────────────────────

/// Runs `collect()` on its own task so the write-back happens even if
/// every waiting reader is dropped.
fn spawn_refresh(inner: Arc<Inner>, epoch: u64) -> Refresh {
    let task = tokio::spawn(refresh(inner.clone(), epoch));

    async move {
        task.await.unwrap_or_else(|e| {
            inner.finish(epoch);
            Err(SourceError::new(Category::System, format!("refresh task failed: {e}")))
        })
    }
    .boxed()
    .shared()
}

async fn refresh(inner: Arc<Inner>, epoch: u64) -> RefreshResult {
    let source = inner.source.clone();
    let started = std::time::Instant::now();

    let result = tokio::task::spawn_blocking(move || source.collect())
        .await
        .unwrap_or_else(|e| {
            Err(SourceError::new(Category::System, format!("collector panicked: {e}")))
        });
    inner.stats.refreshed(result.is_ok(), started.elapsed());

    let result = result.map(Arc::new);
    match &result {
        Ok(snapshot) => inner.store(snapshot.clone(), epoch),
        Err(e) => debug!(category = %e.category, error = %e, "metrics refresh failed"),
    }
    inner.finish(epoch);
    result
}

impl Inner {
    fn store(&self, snapshot: Arc<Snapshot>, epoch: u64) {
        let captured = Captured {
            snapshot,
            at: Instant::now(),
            wall: Utc::now(),
        };

        let mut entry = self.entry.write();
        if entry.epoch != epoch {
            debug!("discarding refresh started before invalidation");
            return;
        }
        entry.captured = Some(captured);
    }

    /// Clear the in-flight slot if it still belongs to this epoch.
    fn finish(&self, epoch: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.epoch == epoch) {
            *slot = None;
        }
    }
}

// ─── Serde helpers ───────────────────────────────────────────────

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn opt_as_millis<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => as_millis(d, s),
        None => s.serialize_none(),
    }
}

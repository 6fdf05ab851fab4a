//! Database statistics.
//!
//! Counters are kept per database and reset when the engine restarts.
//!
//! ```rust,ignore
//! let db = engine.database("notes")?;
//! db.put_document(doc)?;
//! let stats = db.stats();
//! println!("writes: {}, conflicts: {}", stats.writes, stats.conflicts);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one database.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    /// Document and change feed reads.
    reads: AtomicU64,
    /// Successful document writes, deletes included.
    writes: AtomicU64,
    /// Successful deletes.
    deletes: AtomicU64,
    /// Writes rejected with a revision conflict.
    conflicts: AtomicU64,
    /// View builds that applied at least one change.
    view_builds: AtomicU64,
    /// Select scripts run.
    view_selects: AtomicU64,
    /// Operations that failed for any other reason.
    errors: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, deleted: bool) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if deleted {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_select(&self, built: bool) {
        self.view_selects.fetch_add(1, Ordering::Relaxed);
        if built {
            self.view_builds.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of successful writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of successful deletes.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of conflicting writes.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of view builds.
    pub fn view_builds(&self) -> u64 {
        self.view_builds.load(Ordering::Relaxed)
    }

    /// Returns the number of selects.
    pub fn view_selects(&self) -> u64 {
        self.view_selects.load(Ordering::Relaxed)
    }

    /// Returns the number of failed operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            conflicts: self.conflicts(),
            view_builds: self.view_builds(),
            view_selects: self.view_selects(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Document and change feed reads.
    pub reads: u64,
    /// Successful writes.
    pub writes: u64,
    /// Successful deletes.
    pub deletes: u64,
    /// Conflicting writes.
    pub conflicts: u64,
    /// View builds.
    pub view_builds: u64,
    /// Selects.
    pub view_selects: u64,
    /// Failed operations.
    pub errors: u64,
}

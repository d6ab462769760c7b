//! Index statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = index.stats();
//! println!("Merges: {}", stats.merges);
//! println!("Relocations: {}", stats.relocations);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters of one open index.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct IndexStats {
    reads: AtomicU64,
    writes: AtomicU64,
    merges: AtomicU64,
    removes: AtomicU64,
    deletes: AtomicU64,
    /// Records moved to another size class.
    relocations: AtomicU64,
    shrinks: AtomicU64,
    evicted: AtomicU64,
    dumped: AtomicU64,
    repairs: AtomicU64,
}

impl IndexStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_merge(&self) {
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_relocation(&self) {
        self.relocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one shrink that evicted `evicted` elements, `dumped` of which
    /// reached the commons dump.
    pub(crate) fn record_shrink(&self, evicted: u64, dumped: u64) {
        self.shrinks.fetch_add(1, Ordering::Relaxed);
        self.evicted.fetch_add(evicted, Ordering::Relaxed);
        self.dumped.fetch_add(dumped, Ordering::Relaxed);
    }

    pub(crate) fn record_repair(&self) {
        self.repairs.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of collection reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of `put` calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of `merge` calls.
    pub fn merges(&self) -> u64 {
        self.merges.load(Ordering::Relaxed)
    }

    /// Returns the number of element `remove` calls.
    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    /// Returns the number of deleted keys.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of records moved between size classes.
    pub fn relocations(&self) -> u64 {
        self.relocations.load(Ordering::Relaxed)
    }

    /// Returns the number of shrinks.
    pub fn shrinks(&self) -> u64 {
        self.shrinks.load(Ordering::Relaxed)
    }

    /// Returns the number of evicted elements.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Returns the number of evicted elements written to the commons dump.
    pub fn dumped(&self) -> u64 {
        self.dumped.load(Ordering::Relaxed)
    }

    /// Returns the number of self-heal repairs.
    pub fn repairs(&self) -> u64 {
        self.repairs.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            merges: self.merges(),
            removes: self.removes(),
            deletes: self.deletes(),
            relocations: self.relocations(),
            shrinks: self.shrinks(),
            evicted: self.evicted(),
            dumped: self.dumped(),
            repairs: self.repairs(),
        }
    }
}

/// A point-in-time copy of [`IndexStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Collection reads.
    pub reads: u64,
    /// `put` calls.
    pub writes: u64,
    /// `merge` calls.
    pub merges: u64,
    /// Element `remove` calls.
    pub removes: u64,
    /// Deleted keys.
    pub deletes: u64,
    /// Records moved between size classes.
    pub relocations: u64,
    /// Shrinks of over-large collections.
    pub shrinks: u64,
    /// Elements evicted by shrinks.
    pub evicted: u64,
    /// Evicted elements written to the commons dump.
    pub dumped: u64,
    /// Self-heal repairs.
    pub repairs: u64,
}

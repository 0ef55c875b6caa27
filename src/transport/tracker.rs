//! Watcher task bookkeeping.
//!
//! # Responsibilities
//! - Count live watchdog watcher tasks
//! - Number watchers per layer for tracing
//! - Release the count on every exit path via an RAII guard

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Tracks live watcher tasks of one watchdog layer.
///
/// Cloning shares the same counters, so the layer, every service built from
/// it and every watcher task report into one place.
#[derive(Debug, Clone, Default)]
pub struct WatcherTracker {
    active_count: Arc<AtomicU64>,
    armed_total: Arc<AtomicU64>,
}

impl WatcherTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live watcher. Returns a guard that decrements on drop.
    pub fn track(&self) -> WatcherGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        // Relaxed: the sequence number only labels log lines.
        let seq = self.armed_total.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::watcher_started();
        WatcherGuard {
            active_count: Arc::clone(&self.active_count),
            seq,
        }
    }

    /// Number of watchers currently alive.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Number of watchers ever armed.
    pub fn armed_total(&self) -> u64 {
        self.armed_total.load(Ordering::Relaxed)
    }
}

/// Guard held by a watcher task for its whole lifetime.
#[derive(Debug)]
pub struct WatcherGuard {
    active_count: Arc<AtomicU64>,
    seq: u64,
}

impl WatcherGuard {
    /// Position of this watcher among those armed by its layer, starting at 1.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::watcher_stopped();
        tracing::trace!(watcher = self.seq, "Watcher stopped");
    }
}

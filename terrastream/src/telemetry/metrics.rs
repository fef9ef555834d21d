//! Atomic counter collection for the streaming core.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::StreamSnapshot;

/// Counters recorded by the scheduler and orchestrator.
///
/// All counters are monotonically increasing and relaxed: they feed
/// diagnostics, never control flow.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    submitted: AtomicU64,
    rejected_duplicate: AtomicU64,
    rejected_capacity: AtomicU64,
    dispatched: AtomicU64,
    loaded: AtomicU64,
    missing: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    stale_discarded: AtomicU64,
    cancelled_queued: AtomicU64,
    cancelled_in_flight: AtomicU64,
    unloaded: AtomicU64,
    ticks: AtomicU64,
    cell_changes: AtomicU64,
}

impl StreamMetrics {
    /// Creates a zeroed metrics collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// A load entry was accepted into the queue.
    pub fn load_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A submission was refused: equivalent entry already tracked.
    pub fn duplicate_rejected(&self) {
        self.rejected_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// A submission was refused: queue at hard capacity.
    pub fn capacity_rejected(&self) {
        self.rejected_capacity.fetch_add(1, Ordering::Relaxed);
    }

    /// A queued entry was handed to the content loader.
    pub fn load_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// A load completed with content.
    pub fn load_completed(&self) {
        self.loaded.fetch_add(1, Ordering::Relaxed);
    }

    /// A load completed without content (recorded as empty resident).
    pub fn content_missing(&self) {
        self.missing.fetch_add(1, Ordering::Relaxed);
    }

    /// A load failed.
    pub fn load_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A failed load was resubmitted.
    pub fn load_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// A completion arrived for a cancelled or superseded request.
    pub fn stale_completion_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// A queued (not yet dispatched) entry was cancelled.
    pub fn queued_cancelled(&self) {
        self.cancelled_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// An in-flight request was cancelled (best effort).
    pub fn in_flight_cancelled(&self) {
        self.cancelled_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// A resident target was released.
    pub fn target_unloaded(&self) {
        self.unloaded.fetch_add(1, Ordering::Relaxed);
    }

    /// An orchestrator tick ran.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// The observer entered a new cell.
    pub fn cell_changed(&self) {
        self.cell_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected_duplicate: self.rejected_duplicate.load(Ordering::Relaxed),
            rejected_capacity: self.rejected_capacity.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            loaded: self.loaded.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            cancelled_queued: self.cancelled_queued.load(Ordering::Relaxed),
            cancelled_in_flight: self.cancelled_in_flight.load(Ordering::Relaxed),
            unloaded: self.unloaded.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            cell_changes: self.cell_changes.load(Ordering::Relaxed),
        }
    }
}

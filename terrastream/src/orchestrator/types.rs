//! Orchestrator result and bookkeeping types.

use std::time::Instant;

use crate::coord::CellCoord;

/// What one orchestrator tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// The observer's cell this tick.
    pub observer_cell: CellCoord,
    /// True when the observer entered a new cell this tick.
    pub cell_changed: bool,
    /// Targets released synchronously this tick.
    pub unloaded: usize,
    /// Load entries accepted into the queue this tick.
    pub submitted: usize,
    /// Queue entries dispatched to the loader this tick.
    pub dispatched: usize,
    /// Completions applied this tick.
    pub applied: usize,
}

/// Failure bookkeeping for one target awaiting retry.
#[derive(Debug, Clone, Copy)]
pub(super) struct RetryState {
    /// Failures observed so far.
    pub attempts: u32,
    /// Earliest instant the next attempt may be submitted.
    pub next_attempt: Instant,
}

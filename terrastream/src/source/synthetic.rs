//! Deterministic synthetic content source.
//!
//! Stands in for a real world backend in simulations and tests: content
//! is fabricated after a configurable latency, a striped subset of cells
//! reports no content (the way ocean regions do in a real island world),
//! and transient failures can be scripted per target to exercise the
//! retry path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{ContentHandle, ContentSource, LoadOutcome, LoadRequest};
use crate::coord::CellCoord;
use crate::error::LoadError;
use crate::index::TargetId;

/// A fabricated world for driving the scheduler end to end.
pub struct SyntheticSource {
    latency: Duration,
    /// Cells on every `ocean_stripe`-th diagonal have no content; 0
    /// disables the stripes entirely.
    ocean_stripe: i32,
    mid_block: u32,
    far_block: u32,
    next_handle: AtomicU64,
    scripted_failures: Mutex<HashMap<TargetId, u32>>,
}

impl SyntheticSource {
    /// Creates a source with the given per-load latency and no ocean.
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ocean_stripe: 0,
            mid_block: 4,
            far_block: 8,
            next_handle: AtomicU64::new(1),
            scripted_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Enables ocean stripes: cells where `(x - y) % stripe == 0` have no
    /// content.
    pub fn with_ocean_stripe(mut self, stripe: i32) -> Self {
        self.ocean_stripe = stripe.max(0);
        self
    }

    /// Sets the block sizes used to enumerate aggregate cells. Must match
    /// the aggregator configuration driving the requests.
    pub fn with_block_sizes(mut self, mid_block: u32, far_block: u32) -> Self {
        self.mid_block = mid_block;
        self.far_block = far_block;
        self
    }

    /// Scripts `count` transient failures for a target; subsequent loads
    /// succeed.
    pub fn script_failures(&self, target: TargetId, count: u32) {
        self.scripted_failures.lock().insert(target, count);
    }

    fn is_ocean_cell(&self, cell: &CellCoord) -> bool {
        self.ocean_stripe > 0 && (cell.x - cell.y).rem_euclid(self.ocean_stripe) == 0
    }

    fn target_cells(&self, target: &TargetId) -> Vec<CellCoord> {
        match target {
            TargetId::Cell(c) => vec![*c],
            TargetId::Aggregate(a) => {
                let bs = match a.tier {
                    crate::tier::Tier::Far => self.far_block,
                    _ => self.mid_block,
                };
                crate::aggregate::ChunkAggregator::aggregate_to_cells(a.block, bs)
            }
        }
    }

    fn take_scripted_failure(&self, target: &TargetId) -> bool {
        let mut failures = self.scripted_failures.lock();
        match failures.get_mut(target) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    failures.remove(target);
                }
                true
            }
            _ => false,
        }
    }

    fn materialize(&self, target: &TargetId) -> LoadOutcome {
        if self.take_scripted_failure(target) {
            return LoadOutcome::Failed(LoadError::transient("scripted backend failure"));
        }
        let cells: Vec<CellCoord> = self
            .target_cells(target)
            .into_iter()
            .filter(|c| !self.is_ocean_cell(c))
            .collect();
        if cells.is_empty() {
            return LoadOutcome::Missing;
        }
        let handle = ContentHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        LoadOutcome::Loaded {
            handles: vec![handle],
            cells,
        }
    }
}

impl ContentSource for SyntheticSource {
    fn has_content(&self, target: &TargetId) -> bool {
        self.target_cells(target)
            .iter()
            .any(|c| !self.is_ocean_cell(c))
    }

    fn load(
        &self,
        request: LoadRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, LoadOutcome> {
        // Outcome is decided at dispatch; the future only models latency.
        let outcome = self.materialize(&request.target);
        let latency = self.latency;
        Box::pin(async move {
            if latency.is_zero() {
                return outcome;
            }
            tokio::select! {
                _ = cancel.cancelled() => LoadOutcome::Cancelled,
                _ = tokio::time::sleep(latency) => outcome,
            }
        })
    }
}

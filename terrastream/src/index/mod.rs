//! Residency bookkeeping for streamed targets.
//!
//! The [`SpatialIndex`] is the single source of truth for what is resident
//! and what is pending, per tier. It owns the [`ResidentRecord`]s; nothing
//! else holds them. On release the record is handed back to the caller so
//! the orchestrator can detach renderer/physics state before dropping it —
//! the index itself holds no rendering state.
//!
//! Invariant: a (target, tier) key is never simultaneously resident and
//! pending. Transitions are strictly pending -> resident (or dropped) and
//! resident -> released -> absent.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use crate::aggregate::AggregateId;
use crate::coord::CellCoord;
use crate::source::ContentHandle;
use crate::tier::Tier;

/// The unit of streaming: a single cell (Near) or an aggregated block
/// (Mid/Far). Always paired with a [`Tier`] when used as a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
    /// One base grid cell.
    Cell(CellCoord),
    /// One coarse block of cells.
    Aggregate(AggregateId),
}

impl TargetId {
    /// A representative cell for distance/priority math: the cell itself,
    /// or the north-west corner cell of a block.
    pub fn anchor_cell(&self, block_size: u32) -> CellCoord {
        match self {
            TargetId::Cell(c) => *c,
            TargetId::Aggregate(a) => {
                let bs = block_size as i32;
                CellCoord::new(a.block.x * bs, a.block.y * bs)
            }
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Cell(c) => write!(f, "cell{c}"),
            TargetId::Aggregate(a) => write!(f, "block{a}"),
        }
    }
}

/// Composite key the index and scheduler agree on.
pub type TargetKey = (TargetId, Tier);

/// Content bookkeeping for one resident target.
///
/// `handles` are opaque references issued by the content source. An empty
/// record is a valid resident state: it marks a target known to have no
/// content (ocean, void) so the scheduler does not retry it.
#[derive(Debug, Clone)]
pub struct ResidentRecord {
    /// Opaque content handles returned by the loader.
    pub handles: Vec<ContentHandle>,
    /// Sub-cells that contributed data (relevant for aggregate loads).
    pub cells: Vec<CellCoord>,
    /// When the record became resident.
    pub loaded_at: Instant,
}

impl ResidentRecord {
    /// Creates a record from loader output.
    pub fn new(handles: Vec<ContentHandle>, cells: Vec<CellCoord>) -> Self {
        Self {
            handles,
            cells,
            loaded_at: Instant::now(),
        }
    }

    /// Creates the empty record used for content misses.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// True when the target has no content (a recorded miss).
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Result of diffing a wanted set against the index for one tier.
#[derive(Debug, Default)]
pub struct IndexDiff {
    /// Wanted, not resident, not pending: needs a load request.
    pub to_load: Vec<TargetId>,
    /// Resident but no longer wanted: release immediately.
    pub to_unload: Vec<TargetId>,
    /// Pending but no longer wanted: cancel the outstanding request.
    pub to_cancel: Vec<TargetId>,
}

/// Tracks resident and in-flight targets per tier.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    resident: HashMap<TargetKey, ResidentRecord>,
    pending: HashSet<TargetKey>,
}

impl SpatialIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `wanted` against current residency for `tier`.
    pub fn diff(&self, wanted: &HashSet<TargetId>, tier: Tier) -> IndexDiff {
        let mut diff = IndexDiff::default();
        for target in wanted {
            let key = (*target, tier);
            if !self.resident.contains_key(&key) && !self.pending.contains(&key) {
                diff.to_load.push(*target);
            }
        }
        for (target, t) in self.resident.keys() {
            if *t == tier && !wanted.contains(target) {
                diff.to_unload.push(*target);
            }
        }
        for (target, t) in self.pending.iter() {
            if *t == tier && !wanted.contains(target) {
                diff.to_cancel.push(*target);
            }
        }
        diff
    }

    /// Marks a target as having an outstanding load request.
    ///
    /// Returns false (and does nothing) if the target is already resident
    /// or already pending — the resident/pending exclusivity invariant.
    pub fn mark_pending(&mut self, target: TargetId, tier: Tier) -> bool {
        let key = (target, tier);
        if self.resident.contains_key(&key) {
            return false;
        }
        self.pending.insert(key)
    }

    /// Clears pending state without making the target resident (cancel or
    /// failure paths). Returns true if the target was pending.
    pub fn clear_pending(&mut self, target: TargetId, tier: Tier) -> bool {
        self.pending.remove(&(target, tier))
    }

    /// Promotes a pending target to resident.
    ///
    /// Returns false if the target was not pending (stale completions must
    /// be filtered by the scheduler before this is called).
    pub fn mark_resident(&mut self, target: TargetId, tier: Tier, record: ResidentRecord) -> bool {
        let key = (target, tier);
        if !self.pending.remove(&key) {
            return false;
        }
        debug_assert!(!self.resident.contains_key(&key));
        self.resident.insert(key, record);
        true
    }

    /// Releases a resident target, handing its record to the caller.
    pub fn mark_released(&mut self, target: TargetId, tier: Tier) -> Option<ResidentRecord> {
        self.resident.remove(&(target, tier))
    }

    /// True if the target is resident at the tier.
    pub fn is_resident(&self, target: &TargetId, tier: Tier) -> bool {
        self.resident.contains_key(&(*target, tier))
    }

    /// True if the target has an outstanding request at the tier.
    pub fn is_pending(&self, target: &TargetId, tier: Tier) -> bool {
        self.pending.contains(&(*target, tier))
    }

    /// Resident record for a target, if any.
    pub fn resident_record(&self, target: &TargetId, tier: Tier) -> Option<&ResidentRecord> {
        self.resident.get(&(*target, tier))
    }

    /// Number of resident targets at a tier.
    pub fn resident_count(&self, tier: Tier) -> usize {
        self.resident.keys().filter(|(_, t)| *t == tier).count()
    }

    /// Number of pending targets at a tier.
    pub fn pending_count(&self, tier: Tier) -> usize {
        self.pending.iter().filter(|(_, t)| *t == tier).count()
    }

    /// Total resident targets across all tiers.
    pub fn total_resident(&self) -> usize {
        self.resident.len()
    }

    /// Drains every resident record, for teleport/shutdown. The caller
    /// detaches collaborators before dropping the records.
    pub fn drain_resident(&mut self) -> Vec<(TargetKey, ResidentRecord)> {
        self.resident.drain().collect()
    }

    /// Drops all pending marks (the scheduler cancels the requests).
    pub fn clear_all_pending(&mut self) -> Vec<TargetKey> {
        self.pending.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_target(x: i32, y: i32) -> TargetId {
        TargetId::Cell(CellCoord::new(x, y))
    }

    fn block_target(x: i32, y: i32, tier: Tier) -> TargetId {
        TargetId::Aggregate(AggregateId::new(tier, CellCoord::new(x, y)))
    }

    #[test]
    fn test_pending_then_resident() {
        let mut index = SpatialIndex::new();
        let t = cell_target(1, 2);

        assert!(index.mark_pending(t, Tier::Near));
        assert!(index.is_pending(&t, Tier::Near));
        assert!(!index.is_resident(&t, Tier::Near));

        assert!(index.mark_resident(t, Tier::Near, ResidentRecord::empty()));
        assert!(index.is_resident(&t, Tier::Near));
        assert!(!index.is_pending(&t, Tier::Near));
    }

    #[test]
    fn test_never_resident_and_pending() {
        let mut index = SpatialIndex::new();
        let t = cell_target(0, 0);

        index.mark_pending(t, Tier::Near);
        index.mark_resident(t, Tier::Near, ResidentRecord::empty());

        // Resident target cannot be marked pending again.
        assert!(!index.mark_pending(t, Tier::Near));
        assert!(index.is_resident(&t, Tier::Near));
        assert!(!index.is_pending(&t, Tier::Near));
    }

    #[test]
    fn test_mark_pending_idempotent() {
        let mut index = SpatialIndex::new();
        let t = cell_target(0, 0);
        assert!(index.mark_pending(t, Tier::Near));
        assert!(!index.mark_pending(t, Tier::Near));
        assert_eq!(index.pending_count(Tier::Near), 1);
    }

    #[test]
    fn test_mark_resident_requires_pending() {
        let mut index = SpatialIndex::new();
        let t = cell_target(0, 0);
        // A completion for a target that was never pending is refused.
        assert!(!index.mark_resident(t, Tier::Near, ResidentRecord::empty()));
        assert!(!index.is_resident(&t, Tier::Near));
    }

    #[test]
    fn test_tiers_are_independent_keys() {
        let mut index = SpatialIndex::new();
        let t = cell_target(3, 3);
        index.mark_pending(t, Tier::Near);
        index.mark_resident(t, Tier::Near, ResidentRecord::empty());

        // The same target at a different tier is a distinct key.
        assert!(!index.is_resident(&t, Tier::Mid));
        assert!(index.mark_pending(t, Tier::Mid));
    }

    #[test]
    fn test_release_hands_record_back() {
        let mut index = SpatialIndex::new();
        let t = block_target(1, 1, Tier::Mid);
        index.mark_pending(t, Tier::Mid);
        let record = ResidentRecord::new(
            vec![ContentHandle::new(7)],
            vec![CellCoord::new(4, 4)],
        );
        index.mark_resident(t, Tier::Mid, record);

        let released = index.mark_released(t, Tier::Mid).unwrap();
        assert_eq!(released.handles, vec![ContentHandle::new(7)]);
        assert!(!index.is_resident(&t, Tier::Mid));
        assert!(index.mark_released(t, Tier::Mid).is_none());
    }

    #[test]
    fn test_diff_partitions_correctly() {
        let mut index = SpatialIndex::new();
        let resident = cell_target(0, 0);
        let pending = cell_target(1, 0);
        let stale_resident = cell_target(2, 0);
        let stale_pending = cell_target(3, 0);
        let missing = cell_target(4, 0);

        index.mark_pending(resident, Tier::Near);
        index.mark_resident(resident, Tier::Near, ResidentRecord::empty());
        index.mark_pending(pending, Tier::Near);
        index.mark_pending(stale_resident, Tier::Near);
        index.mark_resident(stale_resident, Tier::Near, ResidentRecord::empty());
        index.mark_pending(stale_pending, Tier::Near);

        let wanted: HashSet<TargetId> = [resident, pending, missing].into_iter().collect();
        let diff = index.diff(&wanted, Tier::Near);

        assert_eq!(diff.to_load, vec![missing]);
        assert_eq!(diff.to_unload, vec![stale_resident]);
        assert_eq!(diff.to_cancel, vec![stale_pending]);
    }

    #[test]
    fn test_diff_ignores_other_tiers() {
        let mut index = SpatialIndex::new();
        let t = cell_target(0, 0);
        index.mark_pending(t, Tier::Mid);

        let wanted: HashSet<TargetId> = HashSet::new();
        let diff = index.diff(&wanted, Tier::Near);
        assert!(diff.to_cancel.is_empty());
        assert!(diff.to_unload.is_empty());
    }

    #[test]
    fn test_counts() {
        let mut index = SpatialIndex::new();
        for x in 0..3 {
            let t = cell_target(x, 0);
            index.mark_pending(t, Tier::Near);
        }
        index.mark_resident(cell_target(0, 0), Tier::Near, ResidentRecord::empty());

        assert_eq!(index.pending_count(Tier::Near), 2);
        assert_eq!(index.resident_count(Tier::Near), 1);
        assert_eq!(index.total_resident(), 1);
    }

    #[test]
    fn test_drain_resident() {
        let mut index = SpatialIndex::new();
        for x in 0..4 {
            let t = cell_target(x, 0);
            index.mark_pending(t, Tier::Near);
            index.mark_resident(t, Tier::Near, ResidentRecord::empty());
        }
        let drained = index.drain_resident();
        assert_eq!(drained.len(), 4);
        assert_eq!(index.total_resident(), 0);
    }

    #[test]
    fn test_anchor_cell() {
        assert_eq!(
            cell_target(5, -3).anchor_cell(4),
            CellCoord::new(5, -3)
        );
        let block = block_target(-2, 1, Tier::Mid);
        assert_eq!(block.anchor_cell(4), CellCoord::new(-8, 4));
    }

    #[test]
    fn test_resident_record_empty() {
        let empty = ResidentRecord::empty();
        assert!(empty.is_empty());
        let full = ResidentRecord::new(vec![ContentHandle::new(1)], vec![]);
        assert!(!full.is_empty());
    }
}

//! Bounded priority queue of pending loads.
//!
//! Entries are ordered by [`LoadPriority`] (lower value drains first),
//! then by submission order (FIFO within equal priority, via a sequence
//! number). This gives:
//!
//! 1. Finer tiers drain before coarser ones (the tier stride dominates)
//! 2. Nearer targets drain before farther ones within a tier
//! 3. Equal-priority targets drain in submission order (stable queue)
//!
//! The queue holds at most one entry per (target, tier) and rejects pushes
//! beyond its hard capacity — both rejections are the caller's to count,
//! not errors.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

use super::policy::LoadPriority;
use crate::index::{TargetId, TargetKey};
use crate::tier::Tier;

/// A pending load operation.
#[derive(Debug, Clone)]
pub struct LoadEntry {
    /// What to load.
    pub target: TargetId,
    /// At which fidelity.
    pub tier: Tier,
    /// Queue position; lower drains sooner.
    pub priority: LoadPriority,
    /// When the entry was submitted.
    pub submitted_at: Instant,
}

impl LoadEntry {
    /// Creates an entry submitted now.
    pub fn new(target: TargetId, tier: Tier, priority: LoadPriority) -> Self {
        Self {
            target,
            tier,
            priority,
            submitted_at: Instant::now(),
        }
    }

    /// The (target, tier) key this entry occupies.
    pub fn key(&self) -> TargetKey {
        (self.target, self.tier)
    }
}

/// Heap wrapper carrying the FIFO sequence number.
#[derive(Debug)]
struct QueuedLoad {
    entry: LoadEntry,
    sequence: u64,
}

impl PartialEq for QueuedLoad {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedLoad {}

impl PartialOrd for QueuedLoad {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedLoad {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse both keys so that the lowest
        // priority value pops first, and the lowest sequence (oldest)
        // breaks ties.
        match other
            .entry
            .priority
            .value()
            .total_cmp(&self.entry.priority.value())
        {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushRejection {
    /// An entry for the same (target, tier) is already queued.
    Duplicate,
    /// The queue is at its hard capacity.
    CapacityExhausted,
}

/// Bounded priority queue with per-key uniqueness.
#[derive(Debug)]
pub struct LoadQueue {
    heap: BinaryHeap<QueuedLoad>,
    keys: HashSet<TargetKey>,
    capacity: usize,
    next_sequence: u64,
}

impl LoadQueue {
    /// Creates a queue with the given hard capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
            capacity,
            next_sequence: 0,
        }
    }

    /// Adds an entry.
    pub fn push(&mut self, entry: LoadEntry) -> Result<(), PushRejection> {
        let key = entry.key();
        if self.keys.contains(&key) {
            return Err(PushRejection::Duplicate);
        }
        if self.heap.len() >= self.capacity {
            return Err(PushRejection::CapacityExhausted);
        }
        self.keys.insert(key);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedLoad { entry, sequence });
        Ok(())
    }

    /// Removes and returns the highest-urgency entry.
    pub fn pop(&mut self) -> Option<LoadEntry> {
        let queued = self.heap.pop()?;
        self.keys.remove(&queued.entry.key());
        Some(queued.entry)
    }

    /// Reference to the next entry without removing it.
    pub fn peek(&self) -> Option<&LoadEntry> {
        self.heap.peek().map(|q| &q.entry)
    }

    /// True if an entry for the key is queued.
    pub fn contains(&self, key: &TargetKey) -> bool {
        self.keys.contains(key)
    }

    /// Removes the entry for a key, if queued. Returns true on removal.
    ///
    /// Rebuilds the heap; acceptable at the queue's bounded size.
    pub fn remove(&mut self, key: &TargetKey) -> bool {
        if !self.keys.remove(key) {
            return false;
        }
        let remaining: Vec<QueuedLoad> =
            self.heap.drain().filter(|q| q.entry.key() != *key).collect();
        self.heap = BinaryHeap::from(remaining);
        true
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The hard capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.keys.clear();
    }

    /// Number of queued entries per tier, for diagnostics.
    pub fn tier_counts(&self) -> std::collections::HashMap<Tier, usize> {
        let mut counts = std::collections::HashMap::new();
        for queued in self.heap.iter() {
            *counts.entry(queued.entry.tier).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::CellCoord;

    fn entry(x: i32, tier: Tier, priority: f64) -> LoadEntry {
        LoadEntry::new(
            TargetId::Cell(CellCoord::new(x, 0)),
            tier,
            LoadPriority::from_value(priority),
        )
    }

    #[test]
    fn test_lowest_priority_value_pops_first() {
        let mut queue = LoadQueue::new(16);
        queue.push(entry(1, Tier::Mid, 105.0)).unwrap();
        queue.push(entry(2, Tier::Near, 3.0)).unwrap();
        queue.push(entry(3, Tier::Far, 210.0)).unwrap();

        assert_eq!(queue.pop().unwrap().tier, Tier::Near);
        assert_eq!(queue.pop().unwrap().tier, Tier::Mid);
        assert_eq!(queue.pop().unwrap().tier, Tier::Far);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_equal_priority() {
        let mut queue = LoadQueue::new(16);
        queue.push(entry(1, Tier::Near, 5.0)).unwrap();
        queue.push(entry(2, Tier::Near, 5.0)).unwrap();
        queue.push(entry(3, Tier::Near, 5.0)).unwrap();

        let order: Vec<i32> = std::iter::from_fn(|| queue.pop())
            .map(|e| match e.target {
                TargetId::Cell(c) => c.x,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut queue = LoadQueue::new(16);
        queue.push(entry(1, Tier::Near, 5.0)).unwrap();
        let result = queue.push(entry(1, Tier::Near, 1.0));
        assert_eq!(result, Err(PushRejection::Duplicate));
        assert_eq!(queue.len(), 1);

        // Same target at another tier is a different key.
        assert!(queue.push(entry(1, Tier::Mid, 100.0)).is_ok());
    }

    #[test]
    fn test_capacity_rejected() {
        let mut queue = LoadQueue::new(2);
        queue.push(entry(1, Tier::Near, 1.0)).unwrap();
        queue.push(entry(2, Tier::Near, 2.0)).unwrap();
        let result = queue.push(entry(3, Tier::Near, 0.5));
        assert_eq!(result, Err(PushRejection::CapacityExhausted));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pop_frees_key_and_capacity() {
        let mut queue = LoadQueue::new(1);
        queue.push(entry(1, Tier::Near, 1.0)).unwrap();
        queue.pop().unwrap();
        // Both the key and the capacity slot are free again.
        assert!(queue.push(entry(1, Tier::Near, 1.0)).is_ok());
    }

    #[test]
    fn test_remove_specific_key() {
        let mut queue = LoadQueue::new(16);
        queue.push(entry(1, Tier::Near, 1.0)).unwrap();
        queue.push(entry(2, Tier::Near, 2.0)).unwrap();
        queue.push(entry(3, Tier::Near, 3.0)).unwrap();

        let key = (TargetId::Cell(CellCoord::new(2, 0)), Tier::Near);
        assert!(queue.remove(&key));
        assert!(!queue.remove(&key));
        assert_eq!(queue.len(), 2);

        // Remaining entries keep their order.
        assert_eq!(queue.pop().unwrap().priority.value(), 1.0);
        assert_eq!(queue.pop().unwrap().priority.value(), 3.0);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = LoadQueue::new(4);
        queue.push(entry(1, Tier::Near, 1.0)).unwrap();
        assert!(queue.peek().is_some());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut queue = LoadQueue::new(4);
        queue.push(entry(1, Tier::Near, 1.0)).unwrap();
        queue.push(entry(2, Tier::Mid, 101.0)).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.push(entry(1, Tier::Near, 1.0)).is_ok());
    }

    #[test]
    fn test_tier_counts() {
        let mut queue = LoadQueue::new(16);
        queue.push(entry(1, Tier::Near, 1.0)).unwrap();
        queue.push(entry(2, Tier::Near, 2.0)).unwrap();
        queue.push(entry(3, Tier::Mid, 101.0)).unwrap();

        let counts = queue.tier_counts();
        assert_eq!(counts.get(&Tier::Near), Some(&2));
        assert_eq!(counts.get(&Tier::Mid), Some(&1));
        assert_eq!(counts.get(&Tier::Far), None);
    }

    #[test]
    fn test_mixed_priority_and_fifo() {
        let mut queue = LoadQueue::new(16);
        queue.push(entry(1, Tier::Mid, 100.0)).unwrap();
        queue.push(entry(2, Tier::Near, 4.0)).unwrap();
        queue.push(entry(3, Tier::Mid, 100.0)).unwrap();
        queue.push(entry(4, Tier::Near, 4.0)).unwrap();

        let order: Vec<i32> = std::iter::from_fn(|| queue.pop())
            .map(|e| match e.target {
                TargetId::Cell(c) => c.x,
                _ => unreachable!(),
            })
            .collect();
        // Near entries first in FIFO order, then Mid entries in FIFO order.
        assert_eq!(order, vec![2, 4, 1, 3]);
    }
}

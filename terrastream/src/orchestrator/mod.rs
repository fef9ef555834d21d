//! Top-level streaming driver.
//!
//! The orchestrator owns every other component and is driven by exactly
//! one call per frame:
//!
//! ```text
//! ObserverPose ──► tick()
//!                   │ cell changed?
//!                   ├─► classifier + aggregator ──► wanted sets per tier
//!                   ├─► SpatialIndex.diff ──► unload now / cancel stale
//!                   ├─► PriorityScheduler.submit (missing + retry-due)
//!                   ├─► PriorityScheduler.drain (budget, dispatch cap)
//!                   └─► poll completions ──► index + SceneSink
//! ```
//!
//! Unloads are synchronous and immediate: deferring them is the primary
//! source of unbounded memory growth when the observer moves fast.
//! Everything slow happens inside the external loader, off this thread.
//!
//! Per-target lifecycle: Unwanted -> Queued -> Dispatched -> Resident ->
//! Released, with Dispatched -> Cancelled -> Unwanted when the wanted set
//! moves away, and Dispatched -> Failed -> Resident(empty) once the retry
//! policy is exhausted.

mod types;

pub use types::TickReport;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use types::RetryState;

use crate::aggregate::ChunkAggregator;
use crate::config::StreamingConfig;
use crate::coord::{CellCoord, ObserverPose};
use crate::error::ConfigError;
use crate::index::{ResidentRecord, SpatialIndex, TargetId, TargetKey};
use crate::scheduler::{LoadEntry, LoadPriority, PriorityScheduler};
use crate::source::{ContentLoader, LoadOutcome, SceneSink};
use crate::telemetry::{StreamMetrics, StreamSnapshot};
use crate::tier::{Tier, TierClassifier};

/// Drives tier classification, residency diffing, scheduling and
/// completion application from a single per-tick entry point.
pub struct StreamingOrchestrator {
    config: StreamingConfig,
    classifier: TierClassifier,
    aggregator: ChunkAggregator,
    index: SpatialIndex,
    scheduler: PriorityScheduler,
    sink: Arc<dyn SceneSink>,
    metrics: Arc<StreamMetrics>,
    observer_cell: Option<CellCoord>,
    /// Wanted targets per loadable tier, refreshed on cell change.
    wanted: HashMap<Tier, HashSet<TargetId>>,
    retries: HashMap<TargetKey, RetryState>,
}

impl StreamingOrchestrator {
    /// Creates an orchestrator. The loader and sink are injected, never
    /// reached through globals.
    pub fn new(
        config: StreamingConfig,
        loader: Box<dyn ContentLoader>,
        sink: Arc<dyn SceneSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = config.classifier();
        let aggregator = config.aggregator()?;
        let metrics = Arc::new(StreamMetrics::new());
        let scheduler =
            PriorityScheduler::new(loader, config.queue_capacity, Arc::clone(&metrics));
        let mut wanted = HashMap::new();
        for tier in Tier::LOADABLE {
            wanted.insert(tier, HashSet::new());
        }
        info!(world = %config.world_name, "streaming orchestrator ready");
        Ok(Self {
            config,
            classifier,
            aggregator,
            index: SpatialIndex::new(),
            scheduler,
            sink,
            metrics,
            observer_cell: None,
            wanted,
            retries: HashMap::new(),
        })
    }

    /// Runs one frame: refresh wanted sets if the observer changed cell,
    /// submit missing work, drain the queue under budget, apply
    /// completions.
    pub fn tick(&mut self, pose: &ObserverPose) -> TickReport {
        self.metrics.tick();
        let now = Instant::now();
        let cell = pose.cell(self.config.cell_size);
        let cell_changed = self.observer_cell != Some(cell);

        let mut unloaded = 0;
        if cell_changed {
            self.observer_cell = Some(cell);
            self.metrics.cell_changed();
            debug!(cell = %cell, "observer entered new cell");
            unloaded = self.rebuild_wanted(cell);
        }

        let submitted = self.submit_wanted(cell, pose, now);
        let dispatched = self
            .scheduler
            .drain(self.config.tick_budget, self.config.max_dispatch_per_tick);
        let applied = self.apply_completions(now);

        self.classifier.prune(cell, self.config.tracked_radius_cells);

        TickReport {
            observer_cell: cell,
            cell_changed,
            unloaded,
            submitted,
            dispatched,
            applied,
        }
    }

    /// Drops everything and starts over at the new pose: hysteresis state,
    /// queued and in-flight work, and all resident content. Call for
    /// teleports and area changes, where stale state would bias the first
    /// classification at the destination.
    pub fn teleport(&mut self, pose: &ObserverPose) -> TickReport {
        info!(position = ?pose.position, "teleport: resetting streaming state");
        self.classifier.reset();
        self.scheduler.cancel_all();
        self.index.clear_all_pending();
        for ((target, tier), record) in self.index.drain_resident() {
            if !record.is_empty() {
                self.sink.detach(&target, tier);
            }
            self.metrics.target_unloaded();
        }
        self.retries.clear();
        for set in self.wanted.values_mut() {
            set.clear();
        }
        self.observer_cell = None;
        self.tick(pose)
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StreamSnapshot {
        self.metrics.snapshot()
    }

    /// Shared handle to the metrics collection.
    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The configuration in use.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// The observer's cell as of the last tick.
    pub fn observer_cell(&self) -> Option<CellCoord> {
        self.observer_cell
    }

    /// Resident targets at a tier.
    pub fn resident_count(&self, tier: Tier) -> usize {
        self.index.resident_count(tier)
    }

    /// True if a target is resident at a tier.
    pub fn is_resident(&self, target: &TargetId, tier: Tier) -> bool {
        self.index.is_resident(target, tier)
    }

    /// Queued load entries.
    pub fn queued_len(&self) -> usize {
        self.scheduler.queued_len()
    }

    /// In-flight load requests.
    pub fn in_flight_len(&self) -> usize {
        self.scheduler.in_flight_len()
    }

    /// Recomputes wanted sets for every tier and reconciles the index:
    /// releases stale residents synchronously, cancels stale pending work.
    /// Returns the number of released targets.
    fn rebuild_wanted(&mut self, observer_cell: CellCoord) -> usize {
        // Near: per-cell classification with hysteresis. The scan covers
        // the Near band around the observer plus every cell still recorded
        // Near from earlier ticks, so a cell the observer left behind gets
        // reclassified (and unloaded) instead of silently going stale.
        let scan_radius = self.config.near_scan_radius_cells() as i32;
        let mut candidates: HashSet<CellCoord> = HashSet::new();
        for dy in -scan_radius..=scan_radius {
            for dx in -scan_radius..=scan_radius {
                candidates.insert(CellCoord::new(
                    observer_cell.x.saturating_add(dx),
                    observer_cell.y.saturating_add(dy),
                ));
            }
        }
        candidates.extend(self.classifier.cells_at_tier(Tier::Near));

        let mut near: Vec<(f64, CellCoord)> = Vec::new();
        for cell in candidates {
            let distance = observer_cell.center_distance(&cell, self.config.cell_size);
            if self.classifier.classify(distance, cell) == Tier::Near {
                near.push((distance, cell));
            }
        }
        near.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        near.truncate(self.config.near_cell_cap);
        let near_wanted: HashSet<TargetId> =
            near.into_iter().map(|(_, c)| TargetId::Cell(c)).collect();
        self.wanted.insert(Tier::Near, near_wanted);

        // Mid/Far: aggregate bands. Horizon is skipped entirely — static
        // backdrop, no per-cell work.
        for tier in [Tier::Mid, Tier::Far] {
            let ids = self.aggregator.visible_aggregates(
                observer_cell,
                tier,
                self.config.tiers.start(tier),
                self.config.tiers.end(tier),
            );
            let set: HashSet<TargetId> = ids.into_iter().map(TargetId::Aggregate).collect();
            self.wanted.insert(tier, set);
        }

        // Reconcile each tier: unload immediately, cancel stale requests.
        let mut released = 0;
        for tier in Tier::LOADABLE {
            let wanted = &self.wanted[&tier];
            let diff = self.index.diff(wanted, tier);
            for target in diff.to_unload {
                released += self.release(target, tier);
            }
            for target in diff.to_cancel {
                self.scheduler.cancel(target, tier);
                self.index.clear_pending(target, tier);
                self.retries.remove(&(target, tier));
            }
        }

        // Retry bookkeeping only survives for targets still wanted.
        let wanted = &self.wanted;
        self.retries
            .retain(|(target, tier), _| wanted[tier].contains(target));

        released
    }

    /// Releases one resident target and notifies the sink before the
    /// record is dropped.
    fn release(&mut self, target: TargetId, tier: Tier) -> usize {
        match self.index.mark_released(target, tier) {
            Some(record) => {
                if !record.is_empty() {
                    self.sink.detach(&target, tier);
                }
                self.metrics.target_unloaded();
                1
            }
            None => 0,
        }
    }

    /// Submits every wanted-but-untracked target. Covers three cases with
    /// one pass: newly wanted targets, targets dropped earlier at queue
    /// capacity (resubmitted while still wanted), and failed targets whose
    /// retry delay has elapsed.
    fn submit_wanted(&mut self, observer_cell: CellCoord, pose: &ObserverPose, now: Instant) -> usize {
        let mut batch: Vec<(TargetId, Tier, LoadPriority, bool)> = Vec::new();
        for tier in Tier::LOADABLE {
            for target in &self.wanted[&tier] {
                if self.index.is_resident(target, tier) || self.index.is_pending(target, tier) {
                    continue;
                }
                let is_retry = match self.retries.get(&(*target, tier)) {
                    Some(state) if now < state.next_attempt => continue,
                    Some(_) => true,
                    None => false,
                };
                let priority = self.priority_for(target, tier, observer_cell, pose);
                batch.push((*target, tier, priority, is_retry));
            }
        }

        let mut submitted = 0;
        for (target, tier, priority, is_retry) in batch {
            if self.scheduler.submit(LoadEntry::new(target, tier, priority)) {
                self.index.mark_pending(target, tier);
                if is_retry {
                    self.metrics.load_retried();
                }
                submitted += 1;
            }
        }
        submitted
    }

    /// Queue position for a target, from tier rank, Manhattan distance to
    /// the observer, and the optional heading bias.
    fn priority_for(
        &self,
        target: &TargetId,
        tier: Tier,
        observer_cell: CellCoord,
        pose: &ObserverPose,
    ) -> LoadPriority {
        let center_cell = match target {
            TargetId::Cell(c) => *c,
            TargetId::Aggregate(a) => {
                let bs = self.aggregator.block_size(tier).unwrap_or(1) as i32;
                CellCoord::new(a.block.x * bs + bs / 2, a.block.y * bs + bs / 2)
            }
        };
        let manhattan = observer_cell.manhattan_distance(&center_cell);
        let heading_dot = if self.config.heading_priority {
            pose.heading_dot_to(center_cell.center(self.config.cell_size))
        } else {
            None
        };
        LoadPriority::compute(tier, manhattan, heading_dot)
    }

    /// Applies polled completions: residency, sink attach, retry and
    /// degrade decisions.
    fn apply_completions(&mut self, now: Instant) -> usize {
        let mut applied = 0;
        for (target, tier, outcome) in self.scheduler.poll_completions() {
            let key = (target, tier);
            match outcome {
                LoadOutcome::Loaded { handles, cells } => {
                    let record = ResidentRecord::new(handles, cells);
                    let has_content = !record.is_empty();
                    if self.index.mark_resident(target, tier, record) {
                        self.metrics.load_completed();
                        self.retries.remove(&key);
                        if has_content {
                            if let Some(record) = self.index.resident_record(&target, tier) {
                                self.sink.attach(&target, tier, record);
                            }
                        }
                        applied += 1;
                    } else {
                        self.metrics.stale_completion_discarded();
                    }
                }
                LoadOutcome::Missing => {
                    // A miss is success: resident-with-empty-record stops
                    // the scheduler from retrying until the target leaves
                    // and re-enters the wanted set.
                    if self.index.mark_resident(target, tier, ResidentRecord::empty()) {
                        self.metrics.content_missing();
                        self.retries.remove(&key);
                        applied += 1;
                    } else {
                        self.metrics.stale_completion_discarded();
                    }
                }
                LoadOutcome::Failed(err) => {
                    self.metrics.load_failed();
                    let state = self.retries.entry(key).or_insert(RetryState {
                        attempts: 0,
                        next_attempt: now,
                    });
                    state.attempts += 1;
                    let delay = if err.is_transient() {
                        self.config.retry.delay_for_attempt(state.attempts)
                    } else {
                        None
                    };
                    match delay {
                        Some(delay) => {
                            state.next_attempt = now + delay;
                            self.index.clear_pending(target, tier);
                            debug!(
                                target_id = %target,
                                tier = %tier,
                                attempt = state.attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "load failed, retrying after backoff"
                            );
                        }
                        None => {
                            // Retries exhausted (or permanent failure):
                            // degrade to an empty resident record rather
                            // than churn the queue.
                            self.retries.remove(&key);
                            self.index.mark_resident(target, tier, ResidentRecord::empty());
                            warn!(
                                target_id = %target,
                                tier = %tier,
                                error = %err,
                                "load failed permanently, marking empty"
                            );
                            applied += 1;
                        }
                    }
                }
                LoadOutcome::Cancelled => {
                    // The scheduler filters these; seeing one here means a
                    // race was already resolved. Drop the pending mark.
                    self.index.clear_pending(target, tier);
                    self.metrics.stale_completion_discarded();
                }
            }
        }
        applied
    }
}

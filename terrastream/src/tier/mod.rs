//! Detail tiers and distance classification.
//!
//! Content fidelity is selected purely by distance from the observer. The
//! [`TierTable`] holds the ordered boundary distances; [`TierClassifier`]
//! layers per-cell hysteresis on top so that a cell hovering near a
//! boundary does not flicker between tiers as the observer drifts.
//!
//! Hysteresis state is empirical and per cell: the classifier remembers the
//! last tier it handed out for each cell and refuses a reclassification
//! until the observer is clearly past the boundary (margin `h`). The state
//! must be cleared on teleport, otherwise the first classification after a
//! jump is biased by a stale tier.

use std::collections::HashMap;
use std::fmt;

use crate::coord::CellCoord;
use crate::error::ConfigError;

/// Content fidelity tier, ordered from highest fidelity to lowest.
///
/// `None` means "too far, do not load anything for this cell".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Full-detail cells streamed individually.
    Near,
    /// Aggregated blocks at reduced detail.
    Mid,
    /// Large aggregated blocks at coarse detail.
    Far,
    /// Static backdrop only; no per-cell streaming work.
    Horizon,
    /// Beyond the horizon. Nothing is loaded.
    None,
}

impl Tier {
    /// All tiers in fidelity order.
    pub const ALL: [Tier; 5] = [Tier::Near, Tier::Mid, Tier::Far, Tier::Horizon, Tier::None];

    /// Tiers that stream per-target content. `Horizon` is excluded: it is a
    /// static backdrop with no per-cell work, and `None` loads nothing.
    pub const LOADABLE: [Tier; 3] = [Tier::Near, Tier::Mid, Tier::Far];

    /// Fidelity rank: 0 is the finest tier.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Returns true if `self` is a lower-fidelity tier than `other`.
    pub fn is_coarser_than(self, other: Tier) -> bool {
        self.rank() > other.rank()
    }

    /// Returns true if this tier streams per-target content.
    pub fn is_loadable(self) -> bool {
        matches!(self, Tier::Near | Tier::Mid | Tier::Far)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Near => "near",
            Tier::Mid => "mid",
            Tier::Far => "far",
            Tier::Horizon => "horizon",
            Tier::None => "none",
        };
        write!(f, "{name}")
    }
}

/// Ordered tier boundary distances, in world units.
///
/// Tier `t` spans `[start(t), end(t))`; `Near` starts at 0 and anything
/// beyond `horizon_end` classifies as [`Tier::None`].
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    /// End of the Near band (start of Mid).
    pub near_end: f64,
    /// End of the Mid band (start of Far).
    pub mid_end: f64,
    /// End of the Far band (start of Horizon).
    pub far_end: f64,
    /// End of the Horizon band. Beyond this, nothing loads.
    pub horizon_end: f64,
}

impl Default for TierTable {
    fn default() -> Self {
        // Reference world configuration.
        Self {
            near_end: 500.0,
            mid_end: 2000.0,
            far_end: 5000.0,
            horizon_end: 20_000.0,
        }
    }
}

impl TierTable {
    /// Validates boundary ordering.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 0.0 <= self.near_end
            && self.near_end <= self.mid_end
            && self.mid_end <= self.far_end
            && self.far_end <= self.horizon_end;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::UnorderedTiers)
        }
    }

    /// Raw interval classification, no hysteresis.
    pub fn classify_raw(&self, distance: f64) -> Tier {
        if distance < self.near_end {
            Tier::Near
        } else if distance < self.mid_end {
            Tier::Mid
        } else if distance < self.far_end {
            Tier::Far
        } else if distance <= self.horizon_end {
            Tier::Horizon
        } else {
            Tier::None
        }
    }

    /// Start distance of a tier's band.
    pub fn start(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Near => 0.0,
            Tier::Mid => self.near_end,
            Tier::Far => self.mid_end,
            Tier::Horizon => self.far_end,
            Tier::None => self.horizon_end,
        }
    }

    /// End distance of a tier's band.
    pub fn end(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Near => self.near_end,
            Tier::Mid => self.mid_end,
            Tier::Far => self.far_end,
            Tier::Horizon => self.horizon_end,
            Tier::None => f64::INFINITY,
        }
    }
}

/// Distance-to-tier classifier with per-cell hysteresis.
///
/// A transition away from a cell's previously recorded tier is accepted
/// only when the observer is at least the margin past the shared boundary:
///
/// - to a coarser tier: `distance >= end(previous) + h`
/// - to a finer tier: `distance <= end(raw) - h`
///
/// With `h = 0` the raw classification is always accepted.
pub struct TierClassifier {
    table: TierTable,
    hysteresis: f64,
    states: HashMap<CellCoord, Tier>,
}

impl TierClassifier {
    /// Creates a classifier over the given boundary table.
    pub fn new(table: TierTable, hysteresis: f64) -> Self {
        Self {
            table,
            hysteresis,
            states: HashMap::new(),
        }
    }

    /// The boundary table in use.
    pub fn table(&self) -> &TierTable {
        &self.table
    }

    /// Classifies a cell at `distance`, applying and recording hysteresis.
    pub fn classify(&mut self, distance: f64, cell: CellCoord) -> Tier {
        let raw = self.table.classify_raw(distance);
        let accepted = match self.states.get(&cell) {
            // First sighting of the cell: no hysteresis to apply.
            None => raw,
            Some(&prev) if prev == raw => raw,
            Some(_) if self.hysteresis <= 0.0 => raw,
            Some(&prev) => {
                if raw.is_coarser_than(prev) {
                    if distance >= self.table.end(prev) + self.hysteresis {
                        raw
                    } else {
                        prev
                    }
                } else if distance <= self.table.end(raw) - self.hysteresis {
                    raw
                } else {
                    prev
                }
            }
        };
        self.states.insert(cell, accepted);
        accepted
    }

    /// The last tier recorded for a cell, if it is tracked.
    pub fn last_tier(&self, cell: &CellCoord) -> Option<Tier> {
        self.states.get(cell).copied()
    }

    /// Cells currently recorded at a given tier.
    pub fn cells_at_tier(&self, tier: Tier) -> Vec<CellCoord> {
        self.states
            .iter()
            .filter(|(_, &t)| t == tier)
            .map(|(&c, _)| c)
            .collect()
    }

    /// Number of cells with recorded state.
    pub fn tracked_cells(&self) -> usize {
        self.states.len()
    }

    /// Clears all hysteresis state. Call on teleport or area change.
    pub fn reset(&mut self) {
        self.states.clear();
    }

    /// Drops state for cells beyond `max_radius_cells` (Chebyshev) of the
    /// observer. Returns the number of cells pruned.
    pub fn prune(&mut self, observer: CellCoord, max_radius_cells: u32) -> usize {
        let before = self.states.len();
        self.states
            .retain(|cell, _| cell.chebyshev_distance(&observer) <= max_radius_cells);
        before - self.states.len()
    }
}

impl fmt::Debug for TierClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierClassifier")
            .field("table", &self.table)
            .field("hysteresis", &self.hysteresis)
            .field("tracked_cells", &self.states.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TierTable {
        TierTable::default()
    }

    fn cell() -> CellCoord {
        CellCoord::new(0, 0)
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Mid.is_coarser_than(Tier::Near));
        assert!(Tier::None.is_coarser_than(Tier::Horizon));
        assert!(!Tier::Near.is_coarser_than(Tier::Near));
        assert_eq!(Tier::Near.rank(), 0);
        assert_eq!(Tier::None.rank(), 4);
    }

    #[test]
    fn test_loadable_tiers() {
        assert!(Tier::Near.is_loadable());
        assert!(Tier::Far.is_loadable());
        assert!(!Tier::Horizon.is_loadable());
        assert!(!Tier::None.is_loadable());
    }

    #[test]
    fn test_classify_raw_intervals() {
        let t = table();
        assert_eq!(t.classify_raw(0.0), Tier::Near);
        assert_eq!(t.classify_raw(499.9), Tier::Near);
        assert_eq!(t.classify_raw(500.0), Tier::Mid);
        assert_eq!(t.classify_raw(1999.9), Tier::Mid);
        assert_eq!(t.classify_raw(2000.0), Tier::Far);
        assert_eq!(t.classify_raw(4999.9), Tier::Far);
        assert_eq!(t.classify_raw(5000.0), Tier::Horizon);
        assert_eq!(t.classify_raw(20_000.0), Tier::Horizon);
        assert_eq!(t.classify_raw(20_000.1), Tier::None);
    }

    #[test]
    fn test_classify_raw_exactly_one_tier() {
        // Boundary exclusivity: sweep across every boundary and confirm a
        // single unambiguous answer either side.
        let t = table();
        for d in [0.0, 499.999, 500.0, 2000.0, 5000.0, 20_000.0, 30_000.0] {
            let tier = t.classify_raw(d);
            let again = t.classify_raw(d);
            assert_eq!(tier, again, "classification at {d} must be stable");
        }
    }

    #[test]
    fn test_table_validate() {
        assert!(table().validate().is_ok());
        let bad = TierTable {
            near_end: 600.0,
            mid_end: 500.0,
            ..table()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::UnorderedTiers)));
    }

    #[test]
    fn test_first_classification_uses_raw() {
        let mut c = TierClassifier::new(table(), 50.0);
        // 520 is inside the hysteresis band around 500, but a never-seen
        // cell takes the raw tier directly.
        assert_eq!(c.classify(520.0, cell()), Tier::Mid);
    }

    #[test]
    fn test_hysteresis_blocks_flicker() {
        // Concrete flicker scenario: boundary 500, margin 50, observer
        // oscillating between 480 and 520. Starting classified Near, the
        // tier must hold Near for all 20 steps.
        let mut c = TierClassifier::new(table(), 50.0);
        assert_eq!(c.classify(480.0, cell()), Tier::Near);
        for step in 0..20 {
            let d = if step % 2 == 0 { 520.0 } else { 480.0 };
            assert_eq!(c.classify(d, cell()), Tier::Near, "step {step}");
        }
    }

    #[test]
    fn test_hysteresis_accepts_clear_transition() {
        let mut c = TierClassifier::new(table(), 50.0);
        assert_eq!(c.classify(480.0, cell()), Tier::Near);
        // 549 is within the margin past the boundary; 551 is clearly past.
        assert_eq!(c.classify(549.0, cell()), Tier::Near);
        assert_eq!(c.classify(551.0, cell()), Tier::Mid);
    }

    #[test]
    fn test_hysteresis_finer_transition() {
        let mut c = TierClassifier::new(table(), 50.0);
        assert_eq!(c.classify(600.0, cell()), Tier::Mid);
        // Coming back toward Near: inside the margin stays Mid.
        assert_eq!(c.classify(470.0, cell()), Tier::Mid);
        assert_eq!(c.classify(449.0, cell()), Tier::Near);
    }

    #[test]
    fn test_hysteresis_multi_tier_jump() {
        let mut c = TierClassifier::new(table(), 50.0);
        assert_eq!(c.classify(100.0, cell()), Tier::Near);
        // Jumping straight past Mid into Far: well past end(Near) + h.
        assert_eq!(c.classify(2500.0, cell()), Tier::Far);
        // And back down near the Mid/Far boundary: inside the margin the
        // cell holds Far, clearly inside Mid it transitions.
        assert_eq!(c.classify(1960.0, cell()), Tier::Far);
        assert_eq!(c.classify(1940.0, cell()), Tier::Mid);
    }

    #[test]
    fn test_zero_margin_disables_hysteresis() {
        let mut c = TierClassifier::new(table(), 0.0);
        assert_eq!(c.classify(480.0, cell()), Tier::Near);
        assert_eq!(c.classify(501.0, cell()), Tier::Mid);
        assert_eq!(c.classify(499.0, cell()), Tier::Near);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut c = TierClassifier::new(table(), 50.0);
        c.classify(480.0, cell());
        assert_eq!(c.tracked_cells(), 1);
        c.reset();
        assert_eq!(c.tracked_cells(), 0);
        // After reset the cell is treated as never classified.
        assert_eq!(c.classify(520.0, cell()), Tier::Mid);
    }

    #[test]
    fn test_prune_drops_distant_cells() {
        let mut c = TierClassifier::new(table(), 50.0);
        c.classify(100.0, CellCoord::new(0, 0));
        c.classify(100.0, CellCoord::new(30, 0));
        let pruned = c.prune(CellCoord::new(0, 0), 16);
        assert_eq!(pruned, 1);
        assert!(c.last_tier(&CellCoord::new(0, 0)).is_some());
        assert!(c.last_tier(&CellCoord::new(30, 0)).is_none());
    }

    #[test]
    fn test_cells_at_tier() {
        let mut c = TierClassifier::new(table(), 0.0);
        c.classify(100.0, CellCoord::new(0, 0));
        c.classify(150.0, CellCoord::new(1, 0));
        c.classify(900.0, CellCoord::new(9, 0));
        let near = c.cells_at_tier(Tier::Near);
        assert_eq!(near.len(), 2);
        assert_eq!(c.cells_at_tier(Tier::Mid), vec![CellCoord::new(9, 0)]);
    }
}

//! Chunk aggregation for the coarser tiers.
//!
//! Mid and Far content is streamed in fixed-size blocks of base cells (4x4
//! and 8x8 in the reference configuration) so that one load request covers
//! a whole block instead of dozens of individual cells. Block coordinates
//! come from floor-dividing cell coordinates, which every cell maps into
//! exactly one block per tier, negative coordinates included.
//!
//! [`ChunkAggregator::visible_aggregates`] enumerates the blocks a tier
//! wants around the observer: an annulus test against the tier's distance
//! band, conservative by the block's half-diagonal, sorted nearest-first
//! and truncated to a hard per-tier cap. The cap is a safety valve against
//! flooding the load queue and is enforced unconditionally.

use std::fmt;

use crate::coord::CellCoord;
use crate::error::ConfigError;
use crate::tier::Tier;

/// Identifier of one coarse block of cells at a specific tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateId {
    /// The tier this block belongs to.
    pub tier: Tier,
    /// Block coordinate (cell coordinate floor-divided by block size).
    pub block: CellCoord,
}

impl AggregateId {
    /// Creates an aggregate identifier.
    pub fn new(tier: Tier, block: CellCoord) -> Self {
        Self { tier, block }
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.block, self.tier)
    }
}

/// Grid-to-block math for the aggregated tiers.
#[derive(Debug, Clone)]
pub struct ChunkAggregator {
    cell_size: f64,
    mid_block: u32,
    far_block: u32,
    mid_cap: usize,
    far_cap: usize,
}

impl ChunkAggregator {
    /// Creates an aggregator.
    ///
    /// `mid_block`/`far_block` are block edge lengths in cells;
    /// `mid_cap`/`far_cap` are the hard per-tier visible-aggregate caps.
    pub fn new(
        cell_size: f64,
        mid_block: u32,
        far_block: u32,
        mid_cap: usize,
        far_cap: usize,
    ) -> Result<Self, ConfigError> {
        if cell_size <= 0.0 {
            return Err(ConfigError::OutOfRange("cell_size must be positive".into()));
        }
        if mid_block == 0 || far_block == 0 {
            return Err(ConfigError::OutOfRange("block sizes must be non-zero".into()));
        }
        Ok(Self {
            cell_size,
            mid_block,
            far_block,
            mid_cap,
            far_cap,
        })
    }

    /// Block edge length in cells for an aggregated tier.
    pub fn block_size(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Mid => Some(self.mid_block),
            Tier::Far => Some(self.far_block),
            _ => None,
        }
    }

    /// Hard cap on visible aggregates for an aggregated tier.
    pub fn cap(&self, tier: Tier) -> Option<usize> {
        match tier {
            Tier::Mid => Some(self.mid_cap),
            Tier::Far => Some(self.far_cap),
            _ => None,
        }
    }

    /// Maps a cell to its block coordinate. Floor division: correct for
    /// negative coordinates, where truncating division would be a bug.
    pub fn cell_to_aggregate(cell: CellCoord, block_size: u32) -> CellCoord {
        cell.div_floor(block_size as i32)
    }

    /// Enumerates the cells of a block. Inverse of [`Self::cell_to_aggregate`].
    pub fn aggregate_to_cells(block: CellCoord, block_size: u32) -> Vec<CellCoord> {
        let bs = block_size as i32;
        let mut cells = Vec::with_capacity((block_size * block_size) as usize);
        for dy in 0..bs {
            for dx in 0..bs {
                cells.push(CellCoord::new(block.x * bs + dx, block.y * bs + dy));
            }
        }
        cells
    }

    /// The aggregate containing `cell` at `tier`, if the tier aggregates.
    pub fn aggregate_for_cell(&self, cell: CellCoord, tier: Tier) -> Option<AggregateId> {
        let bs = self.block_size(tier)?;
        Some(AggregateId::new(tier, Self::cell_to_aggregate(cell, bs)))
    }

    /// World-space center of a block.
    pub fn block_center(&self, block: CellCoord, block_size: u32) -> (f64, f64) {
        let span = block_size as f64 * self.cell_size;
        (
            block.x as f64 * span + span / 2.0,
            block.y as f64 * span + span / 2.0,
        )
    }

    /// Blocks whose content a tier wants around the observer, nearest
    /// first, truncated to the tier's cap.
    ///
    /// Inclusion is conservative: a block qualifies when its center lies
    /// within `[min_dist - half_diagonal, max_dist + half_diagonal]` of the
    /// observer cell's center, so a block straddling the band boundary is
    /// kept rather than dropped.
    pub fn visible_aggregates(
        &self,
        observer_cell: CellCoord,
        tier: Tier,
        min_dist: f64,
        max_dist: f64,
    ) -> Vec<AggregateId> {
        let Some(bs) = self.block_size(tier) else {
            return Vec::new();
        };
        let cap = self.cap(tier).unwrap_or(usize::MAX);
        if cap == 0 || max_dist <= 0.0 {
            return Vec::new();
        }

        let span = bs as f64 * self.cell_size;
        let half_diagonal = span * std::f64::consts::SQRT_2 / 2.0;
        let (ox, oy) = observer_cell.center(self.cell_size);

        // Bounding square of candidate blocks, derived from the outer edge
        // of the conservative annulus.
        let reach = max_dist + half_diagonal;
        let radius_blocks = (reach / span).ceil() as i64 + 1;
        let center_block = Self::cell_to_aggregate(observer_cell, bs);

        let mut candidates: Vec<(f64, CellCoord)> = Vec::new();
        for by in -radius_blocks..=radius_blocks {
            for bx in -radius_blocks..=radius_blocks {
                let block = CellCoord::new(
                    center_block.x.saturating_add(bx as i32),
                    center_block.y.saturating_add(by as i32),
                );
                let (cx, cy) = self.block_center(block, bs);
                let dist = ((cx - ox).powi(2) + (cy - oy).powi(2)).sqrt();
                if dist <= max_dist + half_diagonal && dist >= (min_dist - half_diagonal).max(0.0)
                {
                    candidates.push((dist, block));
                }
            }
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        candidates.truncate(cap);
        candidates
            .into_iter()
            .map(|(_, block)| AggregateId::new(tier, block))
            .collect()
    }
}

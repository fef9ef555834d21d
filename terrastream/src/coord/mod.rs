//! Grid coordinate math.
//!
//! The world is an unbounded 2D grid of square cells. Everything in the
//! streaming core keys on [`CellCoord`]; world-space positions only appear
//! at the boundary where the observer's pose is sampled.
//!
//! Cell (0, 0) spans world `[0, cell_size)` on both axes, cell (-1, -1)
//! spans `[-cell_size, 0)`. Conversion is floor division, which keeps the
//! mapping correct for negative positions.

use std::fmt;

/// Cell edge length of the reference world, in world units.
pub const DEFAULT_CELL_SIZE: f64 = 117.0;

/// Integer coordinate of one base grid cell. Unbounded on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    /// Grid column (east positive).
    pub x: i32,
    /// Grid row (north positive).
    pub y: i32,
}

impl CellCoord {
    /// Creates a new cell coordinate.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell, in cells.
    pub fn manhattan_distance(&self, other: &CellCoord) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dy = (self.y as i64 - other.y as i64).unsigned_abs();
        (dx + dy).min(u32::MAX as u64) as u32
    }

    /// Chebyshev (ring) distance to another cell, in cells.
    pub fn chebyshev_distance(&self, other: &CellCoord) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dy = (self.y as i64 - other.y as i64).unsigned_abs();
        dx.max(dy).min(u32::MAX as u64) as u32
    }

    /// Floor-divides both axes by `divisor`.
    ///
    /// This is the cell-to-block mapping. Truncating division would map
    /// cells (-1, -1) and (1, 1) into the same block, which is wrong.
    pub fn div_floor(&self, divisor: i32) -> CellCoord {
        CellCoord {
            x: floor_div(self.x, divisor),
            y: floor_div(self.y, divisor),
        }
    }

    /// World-space center of this cell.
    pub fn center(&self, cell_size: f64) -> (f64, f64) {
        (
            (self.x as f64 + 0.5) * cell_size,
            (self.y as f64 + 0.5) * cell_size,
        )
    }

    /// Euclidean distance between the centers of two cells, in world units.
    pub fn center_distance(&self, other: &CellCoord, cell_size: f64) -> f64 {
        let (ax, ay) = self.center(cell_size);
        let (bx, by) = other.center(cell_size);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Floor division for signed integers.
pub(crate) fn floor_div(a: i32, b: i32) -> i32 {
    let q = a / b;
    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// A sampled world-space position. `x`/`y` are the ground plane the grid
/// partitions; `alt` is altitude above it and plays no part in cell
/// assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPos {
    /// Ground-plane east coordinate, world units.
    pub x: f64,
    /// Ground-plane north coordinate, world units.
    pub y: f64,
    /// Altitude above the ground plane, world units.
    pub alt: f64,
}

impl WorldPos {
    /// Creates a position on the ground plane.
    pub fn new(x: f64, y: f64, alt: f64) -> Self {
        Self { x, y, alt }
    }

    /// The cell containing this position.
    pub fn to_cell(&self, cell_size: f64) -> CellCoord {
        CellCoord {
            x: (self.x / cell_size).floor() as i32,
            y: (self.y / cell_size).floor() as i32,
        }
    }
}

/// Observer pose sampled once per tick: position plus ground-plane heading.
///
/// The heading is used only for the optional front-of-observer priority
/// bias; a zero heading disables it for the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverPose {
    /// Sampled position.
    pub position: WorldPos,
    /// Ground-plane heading east component (need not be normalized).
    pub heading_x: f64,
    /// Ground-plane heading north component.
    pub heading_y: f64,
}

impl ObserverPose {
    /// Creates a pose with an explicit heading.
    pub fn new(position: WorldPos, heading_x: f64, heading_y: f64) -> Self {
        Self {
            position,
            heading_x,
            heading_y,
        }
    }

    /// Creates a stationary pose with no usable heading.
    pub fn at(position: WorldPos) -> Self {
        Self::new(position, 0.0, 0.0)
    }

    /// The cell containing the observer.
    pub fn cell(&self, cell_size: f64) -> CellCoord {
        self.position.to_cell(cell_size)
    }

    /// Normalized heading, or `None` when the heading is degenerate.
    pub fn heading_unit(&self) -> Option<(f64, f64)> {
        let len = (self.heading_x.powi(2) + self.heading_y.powi(2)).sqrt();
        if len < 1e-9 {
            return None;
        }
        Some((self.heading_x / len, self.heading_y / len))
    }

    /// Dot product of the observer heading with the direction from the
    /// observer to `point`. Positive means `point` is ahead.
    pub fn heading_dot_to(&self, point: (f64, f64)) -> Option<f64> {
        let (hx, hy) = self.heading_unit()?;
        let dx = point.0 - self.position.x;
        let dy = point.1 - self.position.y;
        let len = (dx.powi(2) + dy.powi(2)).sqrt();
        if len < 1e-9 {
            return Some(0.0);
        }
        Some(hx * dx / len + hy * dy / len)
    }
}

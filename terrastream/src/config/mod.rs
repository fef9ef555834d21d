//! Deployment configuration.
//!
//! One [`StreamingConfig`] describes one world deployment: tier distances,
//! block sizes, caps, and per-tick budgets. Defaults match the reference
//! world (117-unit cells, Near under 500, Mid under 2000, Far under 5000).
//!
//! Profiles load from INI files so a deployment ships a single editable
//! file per world:
//!
//! ```ini
//! [world]
//! name = la_palma
//! cell_size = 117.0
//!
//! [tiers]
//! near_end = 500.0
//! mid_end = 2000.0
//! far_end = 5000.0
//! horizon_end = 20000.0
//! hysteresis = 50.0
//!
//! [aggregation]
//! mid_block = 4
//! far_block = 8
//! mid_cap = 50
//! far_cap = 60
//! near_cap = 100
//!
//! [scheduler]
//! queue_capacity = 128
//! tick_budget_ms = 2
//! max_dispatch = 8
//! heading_priority = true
//! retry_attempts = 3
//! ```
//!
//! Unknown keys are ignored; missing keys keep their defaults.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use crate::aggregate::ChunkAggregator;
use crate::coord::DEFAULT_CELL_SIZE;
use crate::error::ConfigError;
use crate::scheduler::RetryPolicy;
use crate::tier::{TierClassifier, TierTable};

/// Default per-tick drain budget in milliseconds.
pub const DEFAULT_TICK_BUDGET_MS: u64 = 2;

/// Default dispatch-count cap per tick.
pub const DEFAULT_MAX_DISPATCH: usize = 8;

/// Default hard capacity of the load queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Full configuration of one streaming deployment.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Human-readable world name, for logs.
    pub world_name: String,
    /// Cell edge length in world units.
    pub cell_size: f64,
    /// Tier boundary distances.
    pub tiers: TierTable,
    /// Hysteresis margin at tier boundaries; 0 disables hysteresis.
    pub hysteresis_margin: f64,
    /// Mid-tier block edge, in cells.
    pub mid_block_size: u32,
    /// Far-tier block edge, in cells.
    pub far_block_size: u32,
    /// Hard cap on visible Mid aggregates.
    pub mid_aggregate_cap: usize,
    /// Hard cap on visible Far aggregates.
    pub far_aggregate_cap: usize,
    /// Hard cap on wanted Near cells.
    pub near_cell_cap: usize,
    /// Hard capacity of the load queue.
    pub queue_capacity: usize,
    /// Wall-clock budget for one drain call.
    pub tick_budget: Duration,
    /// Dispatch-count cap for one drain call.
    pub max_dispatch_per_tick: usize,
    /// Prefer targets in front of the observer.
    pub heading_priority: bool,
    /// Retry policy for failed loads.
    pub retry: RetryPolicy,
    /// Radius (cells, Chebyshev) beyond which hysteresis state is pruned.
    pub tracked_radius_cells: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            world_name: "reference".to_string(),
            cell_size: DEFAULT_CELL_SIZE,
            tiers: TierTable::default(),
            hysteresis_margin: 50.0,
            mid_block_size: 4,
            far_block_size: 8,
            mid_aggregate_cap: 50,
            far_aggregate_cap: 60,
            near_cell_cap: 100,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tick_budget: Duration::from_millis(DEFAULT_TICK_BUDGET_MS),
            max_dispatch_per_tick: DEFAULT_MAX_DISPATCH,
            heading_priority: true,
            retry: RetryPolicy::default(),
            tracked_radius_cells: 16,
        }
    }
}

impl StreamingConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_size <= 0.0 {
            return Err(ConfigError::OutOfRange("cell_size must be positive".into()));
        }
        self.tiers.validate()?;
        if self.hysteresis_margin < 0.0 {
            return Err(ConfigError::OutOfRange(
                "hysteresis margin must not be negative".into(),
            ));
        }
        if self.mid_block_size == 0 || self.far_block_size == 0 {
            return Err(ConfigError::OutOfRange("block sizes must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::OutOfRange(
                "queue capacity must be non-zero".into(),
            ));
        }
        if self.max_dispatch_per_tick == 0 {
            return Err(ConfigError::OutOfRange(
                "max dispatch per tick must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Cells to scan around the observer for Near classification. Covers
    /// the Near band plus the hysteresis margin, so boundary cells keep
    /// being reclassified while they could still flip.
    pub fn near_scan_radius_cells(&self) -> u32 {
        ((self.tiers.near_end + self.hysteresis_margin) / self.cell_size).ceil() as u32 + 1
    }

    /// Builds the aggregator this configuration describes.
    pub fn aggregator(&self) -> Result<ChunkAggregator, ConfigError> {
        ChunkAggregator::new(
            self.cell_size,
            self.mid_block_size,
            self.far_block_size,
            self.mid_aggregate_cap,
            self.far_aggregate_cap,
        )
    }

    /// Builds the classifier this configuration describes.
    pub fn classifier(&self) -> TierClassifier {
        TierClassifier::new(self.tiers.clone(), self.hysteresis_margin)
    }

    /// Loads a profile from an INI file, starting from defaults.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path.as_ref()).map_err(|err| match err {
            ini::Error::Io(io) => ConfigError::Io(io),
            ini::Error::Parse(parse) => ConfigError::Parse(parse),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses a profile from INI text, starting from defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(world) = ini.section(Some("world")) {
            if let Some(name) = world.get("name") {
                config.world_name = name.to_string();
            }
            config.cell_size = parse_or(world.get("cell_size"), "world", "cell_size", config.cell_size)?;
        }

        if let Some(tiers) = ini.section(Some("tiers")) {
            config.tiers.near_end =
                parse_or(tiers.get("near_end"), "tiers", "near_end", config.tiers.near_end)?;
            config.tiers.mid_end =
                parse_or(tiers.get("mid_end"), "tiers", "mid_end", config.tiers.mid_end)?;
            config.tiers.far_end =
                parse_or(tiers.get("far_end"), "tiers", "far_end", config.tiers.far_end)?;
            config.tiers.horizon_end = parse_or(
                tiers.get("horizon_end"),
                "tiers",
                "horizon_end",
                config.tiers.horizon_end,
            )?;
            config.hysteresis_margin = parse_or(
                tiers.get("hysteresis"),
                "tiers",
                "hysteresis",
                config.hysteresis_margin,
            )?;
        }

        if let Some(aggregation) = ini.section(Some("aggregation")) {
            config.mid_block_size = parse_or(
                aggregation.get("mid_block"),
                "aggregation",
                "mid_block",
                config.mid_block_size,
            )?;
            config.far_block_size = parse_or(
                aggregation.get("far_block"),
                "aggregation",
                "far_block",
                config.far_block_size,
            )?;
            config.mid_aggregate_cap = parse_or(
                aggregation.get("mid_cap"),
                "aggregation",
                "mid_cap",
                config.mid_aggregate_cap,
            )?;
            config.far_aggregate_cap = parse_or(
                aggregation.get("far_cap"),
                "aggregation",
                "far_cap",
                config.far_aggregate_cap,
            )?;
            config.near_cell_cap = parse_or(
                aggregation.get("near_cap"),
                "aggregation",
                "near_cap",
                config.near_cell_cap,
            )?;
        }

        if let Some(scheduler) = ini.section(Some("scheduler")) {
            config.queue_capacity = parse_or(
                scheduler.get("queue_capacity"),
                "scheduler",
                "queue_capacity",
                config.queue_capacity,
            )?;
            let budget_ms = parse_or(
                scheduler.get("tick_budget_ms"),
                "scheduler",
                "tick_budget_ms",
                DEFAULT_TICK_BUDGET_MS,
            )?;
            config.tick_budget = Duration::from_millis(budget_ms);
            config.max_dispatch_per_tick = parse_or(
                scheduler.get("max_dispatch"),
                "scheduler",
                "max_dispatch",
                config.max_dispatch_per_tick,
            )?;
            config.heading_priority = parse_or(
                scheduler.get("heading_priority"),
                "scheduler",
                "heading_priority",
                config.heading_priority,
            )?;
            config.tracked_radius_cells = parse_or(
                scheduler.get("tracked_radius"),
                "scheduler",
                "tracked_radius",
                config.tracked_radius_cells,
            )?;

            let attempts = parse_or(
                scheduler.get("retry_attempts"),
                "scheduler",
                "retry_attempts",
                config.retry.max_attempts(),
            )?;
            config.retry = match scheduler.get("retry_delay_ms") {
                // An explicit delay selects fixed-interval retries.
                Some(raw) => {
                    let delay_ms: u64 =
                        parse_or(Some(raw), "scheduler", "retry_delay_ms", 0)?;
                    RetryPolicy::fixed(attempts, Duration::from_millis(delay_ms))
                }
                None if attempts <= 1 => RetryPolicy::None,
                None => RetryPolicy::exponential(attempts),
            };
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parses an optional INI value, defaulting when absent.
fn parse_or<T: FromStr>(
    raw: Option<&str>,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(text) => text.trim().parse().map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: text.to_string(),
        }),
    }
}

//! Profile inspection command.

use clap::Args;

use terrastream::config::StreamingConfig;

use crate::error::CliError;

/// Arguments for `terrastream profile`.
#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Streaming profile (INI) to load and validate.
    pub path: std::path::PathBuf,
}

/// Loads a profile and prints the resolved configuration.
pub fn run(args: ProfileArgs) -> Result<(), CliError> {
    let config = StreamingConfig::from_ini_file(&args.path)?;

    println!("profile: {}", args.path.display());
    println!("world:   {}", config.world_name);
    println!("cells:   {} units/cell", config.cell_size);
    println!(
        "tiers:   near <{} / mid <{} / far <{} / horizon <={} (hysteresis {})",
        config.tiers.near_end,
        config.tiers.mid_end,
        config.tiers.far_end,
        config.tiers.horizon_end,
        config.hysteresis_margin
    );
    println!(
        "blocks:  mid {}x{} (cap {}) / far {}x{} (cap {}) / near cap {}",
        config.mid_block_size,
        config.mid_block_size,
        config.mid_aggregate_cap,
        config.far_block_size,
        config.far_block_size,
        config.far_aggregate_cap,
        config.near_cell_cap
    );
    println!(
        "queue:   capacity {} / budget {}ms / max dispatch {} / heading priority {}",
        config.queue_capacity,
        config.tick_budget.as_millis(),
        config.max_dispatch_per_tick,
        config.heading_priority
    );
    println!("retry:   {:?}", config.retry);
    println!("ok");
    Ok(())
}

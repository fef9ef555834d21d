//! Simulated observer flight over a synthetic world.
//!
//! Drives the full streaming stack — orchestrator, scheduler, tokio
//! loader, synthetic content source — along a straight-line flight path
//! and reports the metrics snapshot at the end. Useful for tuning a
//! profile's budgets and caps before wiring in a real content backend.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::{debug, info};

use terrastream::config::StreamingConfig;
use terrastream::coord::{ObserverPose, WorldPos};
use terrastream::orchestrator::StreamingOrchestrator;
use terrastream::source::{NullSink, SyntheticSource, TokioLoader};
use terrastream::tier::Tier;

use crate::error::CliError;

/// Arguments for `terrastream simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Streaming profile (INI). Defaults to the reference configuration.
    #[arg(long)]
    pub profile: Option<std::path::PathBuf>,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    pub ticks: u32,

    /// Wall-clock milliseconds per tick.
    #[arg(long, default_value_t = 10)]
    pub tick_ms: u64,

    /// Observer speed in world units per second.
    #[arg(long, default_value_t = 250.0)]
    pub speed: f64,

    /// Flight heading in degrees (0 = east, 90 = north).
    #[arg(long, default_value_t = 0.0)]
    pub heading_deg: f64,

    /// Observer start position, east coordinate.
    #[arg(long, default_value_t = 0.0)]
    pub start_x: f64,

    /// Observer start position, north coordinate.
    #[arg(long, default_value_t = 0.0)]
    pub start_y: f64,

    /// Observer altitude (cosmetic; does not affect cell assignment).
    #[arg(long, default_value_t = 450.0)]
    pub altitude: f64,

    /// Every n-th diagonal of cells is ocean (no content); 0 disables.
    #[arg(long, default_value_t = 7)]
    pub ocean_stripe: i32,

    /// Synthetic per-load latency in milliseconds.
    #[arg(long, default_value_t = 5)]
    pub latency_ms: u64,

    /// Print the final snapshot as JSON instead of a summary line.
    #[arg(long)]
    pub json: bool,
}

/// Runs the simulation to completion.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let config = match &args.profile {
        Some(path) => StreamingConfig::from_ini_file(path)?,
        None => StreamingConfig::default(),
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(simulate(args, config))
}

async fn simulate(args: SimulateArgs, config: StreamingConfig) -> Result<(), CliError> {
    info!(
        world = %config.world_name,
        ticks = args.ticks,
        speed = args.speed,
        "starting simulated flight"
    );

    let source = Arc::new(
        SyntheticSource::new(Duration::from_millis(args.latency_ms))
            .with_ocean_stripe(args.ocean_stripe)
            .with_block_sizes(config.mid_block_size, config.far_block_size),
    );
    let loader = Box::new(TokioLoader::on_current_runtime(source));
    let mut orchestrator = StreamingOrchestrator::new(config, loader, Arc::new(NullSink))?;

    let heading = args.heading_deg.to_radians();
    let (hx, hy) = (heading.cos(), heading.sin());
    let step = args.speed * args.tick_ms as f64 / 1000.0;
    let mut position = WorldPos::new(args.start_x, args.start_y, args.altitude);

    for tick in 0..args.ticks {
        let pose = ObserverPose::new(position, hx, hy);
        let report = orchestrator.tick(&pose);
        if report.cell_changed {
            debug!(
                cell = %report.observer_cell,
                unloaded = report.unloaded,
                submitted = report.submitted,
                "cell change"
            );
        }
        if tick % 100 == 0 {
            info!(
                cell = %report.observer_cell,
                near = orchestrator.resident_count(Tier::Near),
                mid = orchestrator.resident_count(Tier::Mid),
                far = orchestrator.resident_count(Tier::Far),
                queued = orchestrator.queued_len(),
                in_flight = orchestrator.in_flight_len(),
                "streaming status"
            );
        }
        position.x += hx * step;
        position.y += hy * step;
        tokio::time::sleep(Duration::from_millis(args.tick_ms)).await;
    }

    // Let the tail of in-flight work report back before the summary.
    let final_pose = ObserverPose::new(position, hx, hy);
    for _ in 0..50 {
        orchestrator.tick(&final_pose);
        if orchestrator.in_flight_len() == 0 && orchestrator.queued_len() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let snapshot = orchestrator.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{snapshot}");
        println!(
            "resident: near {} / mid {} / far {} (hit ratio {:.0}%)",
            orchestrator.resident_count(Tier::Near),
            orchestrator.resident_count(Tier::Mid),
            orchestrator.resident_count(Tier::Far),
            snapshot.hit_ratio() * 100.0
        );
    }
    Ok(())
}

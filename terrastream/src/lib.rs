//! TerraStream - distance-tiered terrain streaming scheduler.
//!
//! This library decides, every frame, which grid cells of an effectively
//! unbounded 2D world should be resident at which level of detail as an
//! observer moves through it, keeping per-frame work and memory bounded
//! regardless of world size. It owns the scheduling problem only: tier
//! classification with hysteresis, chunk aggregation for the coarser
//! tiers, the residency index, and a bounded priority queue drained under
//! a time budget against an asynchronous content loader with cooperative
//! cancellation. Parsing world data, building meshes and driving the
//! renderer are external collaborators behind narrow traits.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use terrastream::config::StreamingConfig;
//! use terrastream::coord::{ObserverPose, WorldPos};
//! use terrastream::orchestrator::StreamingOrchestrator;
//! use terrastream::source::{NullSink, SyntheticSource, TokioLoader};
//!
//! let config = StreamingConfig::default();
//! let source = Arc::new(SyntheticSource::new(std::time::Duration::from_millis(5)));
//! let loader = Box::new(TokioLoader::on_current_runtime(source));
//! let mut orchestrator =
//!     StreamingOrchestrator::new(config, loader, Arc::new(NullSink))?;
//!
//! let pose = ObserverPose::at(WorldPos::new(0.0, 0.0, 300.0));
//! let report = orchestrator.tick(&pose);
//! ```

pub mod aggregate;
pub mod config;
pub mod coord;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod scheduler;
pub mod source;
pub mod telemetry;
pub mod tier;

pub use aggregate::{AggregateId, ChunkAggregator};
pub use config::StreamingConfig;
pub use coord::{CellCoord, ObserverPose, WorldPos};
pub use error::{ConfigError, LoadError};
pub use index::{ResidentRecord, SpatialIndex, TargetId};
pub use orchestrator::{StreamingOrchestrator, TickReport};
pub use scheduler::{LoadEntry, LoadPriority, PriorityScheduler, RetryPolicy};
pub use source::{
    ContentHandle, ContentLoader, ContentSource, LoadCompletion, LoadOutcome, LoadRequest,
    NullSink, RequestId, SceneSink, SyntheticSource, TokioLoader,
};
pub use telemetry::{StreamMetrics, StreamSnapshot};
pub use tier::{Tier, TierClassifier, TierTable};

//! Streaming telemetry for observability and tuning.
//!
//! Lock-free atomic counters record every scheduler decision with minimal
//! overhead; a [`StreamSnapshot`] is a point-in-time copy for display or
//! serialization.
//!
//! ```text
//! Scheduler / Orchestrator ──► StreamMetrics ──► StreamSnapshot ──► Views
//!                              (atomic counters)  (plain struct)     (CLI, logs)
//! ```

mod metrics;
mod snapshot;

pub use metrics::StreamMetrics;
pub use snapshot::StreamSnapshot;

//! External collaborator contracts.
//!
//! The streaming core never parses world data, builds meshes, or touches
//! the renderer. It talks to the outside world through three narrow
//! interfaces:
//!
//! - [`ContentSource`]: the asynchronous backend that materializes content
//!   for a target (or reports that there is none — routine for ocean
//!   cells, not an error).
//! - [`ContentLoader`]: the non-blocking submit/poll/cancel facade the
//!   scheduler drives. [`TokioLoader`] is the production implementation;
//!   tests substitute hand-driven fakes.
//! - [`SceneSink`]: the renderer/physics consumer notified when content
//!   becomes resident or is released. All methods default to no-ops, so a
//!   deployment implements only the capabilities it has.

mod loader;
mod synthetic;

pub use loader::TokioLoader;
pub use synthetic::SyntheticSource;

use std::fmt;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::LoadError;
use crate::index::{ResidentRecord, TargetId};
use crate::tier::Tier;

/// Opaque reference to loaded content, issued by the content source.
///
/// The scheduler never interprets handles; it only stores them in
/// [`ResidentRecord`]s and hands them back to the sink on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHandle(u64);

impl ContentHandle {
    /// Wraps a raw handle value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of one dispatched load request.
///
/// Request ids are never reused. A completion whose id no longer matches
/// the live request for its target is stale and must be discarded — this
/// is what prevents a cancelled load from resurrecting dead content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req{}", self.0)
    }
}

/// One load request dispatched to the content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    /// Unique id of this dispatch.
    pub id: RequestId,
    /// What to load.
    pub target: TargetId,
    /// At which fidelity.
    pub tier: Tier,
}

/// Result of one load request.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Content was materialized.
    Loaded {
        /// Opaque handles to the loaded content.
        handles: Vec<ContentHandle>,
        /// Sub-cells that contributed data (aggregate loads).
        cells: Vec<crate::coord::CellCoord>,
    },
    /// The target has no content. Recorded as an empty resident so the
    /// scheduler does not retry it.
    Missing,
    /// The load failed; eligible for retry if transient.
    Failed(LoadError),
    /// The load observed its cancellation token and stopped.
    Cancelled,
}

impl LoadOutcome {
    /// Converts a successful outcome into a resident record.
    pub fn into_record(self) -> Option<ResidentRecord> {
        match self {
            LoadOutcome::Loaded { handles, cells } => Some(ResidentRecord::new(handles, cells)),
            LoadOutcome::Missing => Some(ResidentRecord::empty()),
            _ => None,
        }
    }
}

/// A finished (or failed, or cancelled) load reported by the loader.
#[derive(Debug)]
pub struct LoadCompletion {
    /// The originating request.
    pub request: LoadRequest,
    /// What happened.
    pub outcome: LoadOutcome,
}

/// The asynchronous content backend.
///
/// Implementations run on the tokio runtime and must observe the
/// cancellation token cooperatively: a cancelled load should stop early
/// and return [`LoadOutcome::Cancelled`], though completing anyway is
/// tolerated (the scheduler discards the result).
pub trait ContentSource: Send + Sync + 'static {
    /// Cheap synchronous probe: does this target have any content?
    fn has_content(&self, target: &TargetId) -> bool;

    /// Materializes content for a target at a tier.
    fn load(
        &self,
        request: LoadRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, LoadOutcome>;
}

/// Non-blocking facade over the asynchronous loader.
///
/// The orchestrator tick drives this with submit/poll/cancel and never
/// waits; completions accumulate inside the loader until polled.
pub trait ContentLoader: Send {
    /// Starts a load. Never blocks.
    fn submit(&mut self, request: LoadRequest);

    /// Requests cancellation of an in-flight load. Best-effort: the load
    /// may still complete, and its completion will be discarded upstream.
    fn cancel(&mut self, id: RequestId);

    /// Drains all completions accumulated since the last poll.
    fn poll(&mut self) -> Vec<LoadCompletion>;

    /// Number of loads submitted but not yet reported back.
    fn in_flight(&self) -> usize;
}

/// Renderer/physics consumer of streamed content.
///
/// An explicit optional-capability interface: every method is a default
/// no-op, decided at construction time rather than probed per call. The
/// orchestrator invokes these synchronously from its tick, after a load
/// applies and before a release drops the record.
pub trait SceneSink: Send + Sync {
    /// Content for `target` became resident at `tier`.
    fn attach(&self, _target: &TargetId, _tier: Tier, _record: &ResidentRecord) {}

    /// Content for `target` is about to be released.
    fn detach(&self, _target: &TargetId, _tier: Tier) {}
}

/// A sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SceneSink for NullSink {}

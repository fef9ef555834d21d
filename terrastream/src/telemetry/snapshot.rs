//! Point-in-time view of the streaming counters.

use std::fmt;

use serde::Serialize;

/// A copy of every counter in [`StreamMetrics`], safe to hold across
/// ticks and cheap to serialize.
///
/// [`StreamMetrics`]: super::StreamMetrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSnapshot {
    /// Entries accepted into the load queue.
    pub submitted: u64,
    /// Submissions refused as duplicates.
    pub rejected_duplicate: u64,
    /// Submissions refused at queue capacity.
    pub rejected_capacity: u64,
    /// Entries dispatched to the content loader.
    pub dispatched: u64,
    /// Loads that completed with content.
    pub loaded: u64,
    /// Loads that completed without content (empty resident).
    pub missing: u64,
    /// Loads that failed.
    pub failed: u64,
    /// Failed loads that were resubmitted.
    pub retried: u64,
    /// Completions discarded as stale.
    pub stale_discarded: u64,
    /// Queued entries cancelled before dispatch.
    pub cancelled_queued: u64,
    /// In-flight requests cancelled (best effort).
    pub cancelled_in_flight: u64,
    /// Resident targets released.
    pub unloaded: u64,
    /// Orchestrator ticks.
    pub ticks: u64,
    /// Observer cell changes.
    pub cell_changes: u64,
}

impl StreamSnapshot {
    /// Completions of any kind (content, miss, failure).
    pub fn total_completions(&self) -> u64 {
        self.loaded + self.missing + self.failed
    }

    /// Fraction of dispatched loads that came back with content, in
    /// [0, 1]. Zero when nothing completed yet.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_completions();
        if total == 0 {
            return 0.0;
        }
        self.loaded as f64 / total as f64
    }
}

impl fmt::Display for StreamSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted {} (dup {} / cap {}), dispatched {}, loaded {}, \
             missing {}, failed {} (retried {}), stale {}, cancelled {}+{}, \
             unloaded {}, ticks {} ({} cell changes)",
            self.submitted,
            self.rejected_duplicate,
            self.rejected_capacity,
            self.dispatched,
            self.loaded,
            self.missing,
            self.failed,
            self.retried,
            self.stale_discarded,
            self.cancelled_queued,
            self.cancelled_in_flight,
            self.unloaded,
            self.ticks,
            self.cell_changes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_completions() {
        let snapshot = StreamSnapshot {
            loaded: 10,
            missing: 3,
            failed: 2,
            ..Default::default()
        };
        assert_eq!(snapshot.total_completions(), 15);
    }

    #[test]
    fn test_hit_ratio() {
        let snapshot = StreamSnapshot {
            loaded: 9,
            missing: 1,
            ..Default::default()
        };
        assert!((snapshot.hit_ratio() - 0.9).abs() < 1e-9);
        assert_eq!(StreamSnapshot::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_serializes_to_json() {
        let snapshot = StreamSnapshot {
            submitted: 5,
            ..Default::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"submitted\":5"));
    }

    #[test]
    fn test_display_mentions_key_counters() {
        let snapshot = StreamSnapshot {
            submitted: 7,
            dispatched: 4,
            ..Default::default()
        };
        let text = format!("{snapshot}");
        assert!(text.contains("submitted 7"));
        assert!(text.contains("dispatched 4"));
    }
}

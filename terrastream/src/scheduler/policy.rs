//! Scheduling policy: load priority and failure retry.
//!
//! - [`LoadPriority`]: where a load sits in the queue (lower = sooner).
//! - [`RetryPolicy`]: how the orchestrator handles transient loader
//!   failures before degrading a target to an empty resident record.

use std::fmt;
use std::time::Duration;

use crate::tier::Tier;

// =============================================================================
// Priority
// =============================================================================

/// Per-tier stride of the priority space. Large enough that a finer tier's
/// worst entry still drains before a coarser tier's best entry at the
/// reference band widths.
pub const TIER_PRIORITY_STRIDE: f64 = 100.0;

/// Priority adjustment for targets ahead of / behind the observer.
pub const HEADING_ADJUSTMENT: f64 = 2.0;

/// Heading dot-product threshold beyond which a target counts as clearly
/// ahead (or, negated, clearly behind).
pub const HEADING_DOT_THRESHOLD: f64 = 0.25;

/// Default initial delay before the first load retry.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Default cap on exponential retry delay.
pub const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 10;

/// Default exponential retry multiplier.
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;

/// Queue position of one load. Lower values drain sooner.
///
/// The primary key is the tier rank scaled by [`TIER_PRIORITY_STRIDE`], so
/// finer tiers always drain before coarser ones; the secondary key is
/// Manhattan distance to the observer in cells; an optional adjustment of
/// +/-[`HEADING_ADJUSTMENT`] prefers targets in front of the observer to
/// reduce perceived pop-in.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct LoadPriority(f64);

impl LoadPriority {
    /// Computes a priority from its components.
    ///
    /// `heading_dot` is the dot product of the observer heading with the
    /// direction to the target, when heading bias is enabled and a usable
    /// heading exists.
    pub fn compute(tier: Tier, manhattan_cells: u32, heading_dot: Option<f64>) -> Self {
        let mut value = tier.rank() as f64 * TIER_PRIORITY_STRIDE + manhattan_cells as f64;
        if let Some(dot) = heading_dot {
            if dot > HEADING_DOT_THRESHOLD {
                value -= HEADING_ADJUSTMENT;
            } else if dot < -HEADING_DOT_THRESHOLD {
                value += HEADING_ADJUSTMENT;
            }
        }
        Self(value)
    }

    /// Wraps a raw priority value.
    pub fn from_value(value: f64) -> Self {
        Self(value)
    }

    /// The raw priority value.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for LoadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// How the orchestrator retries a failed load before giving up.
///
/// Giving up is not an error: the target is recorded as an empty resident
/// so the queue is not churned by a permanently broken target until it
/// leaves and re-enters the wanted set.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries: first failure degrades to an empty resident.
    None,

    /// Fixed number of attempts with a constant delay between them.
    Fixed {
        /// Maximum attempts, including the initial one.
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff, the recommended policy for I/O-backed sources.
    ExponentialBackoff {
        /// Maximum attempts, including the initial one.
        max_attempts: u32,
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Upper bound on the delay.
        max_delay: Duration,
        /// Multiplier applied per failure (typically 2.0).
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3)
    }
}

impl RetryPolicy {
    /// Exponential backoff with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_RETRY_MAX_DELAY_SECS),
            multiplier: DEFAULT_RETRY_MULTIPLIER,
        }
    }

    /// Fixed-delay retries.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Delay before retry number `attempt` (1-based: 1 is the first
    /// retry). `None` means the policy is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = (initial_delay.as_millis() as f64 * factor)
                    .min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(delay_ms as u64).min(*max_delay))
            }
        }
    }

    /// Maximum attempts for this policy, including the initial one.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

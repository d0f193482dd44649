//! Freshness contracts for dataset reads.
//!
//! Callers state their staleness tolerance explicitly instead of relying on
//! a hidden cache policy.

use std::time::Duration;

/// Default maximum age for cached datasets: 24 hours, matching the daily
/// warehouse refresh cadence.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Freshness requirement for a dataset read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Accept cached data up to the given age; older copies are re-derived.
    MaxAge { max_age: Duration },

    /// Serve any cached copy regardless of age. Used by bulk preload, where
    /// a stale dashboard beats an empty one.
    Pinned,

    /// Bypass both cached tiers and re-derive from the warehouse. Backs the
    /// dashboard's manual refresh action.
    Refresh,
}

impl Freshness {
    pub fn max_age(max_age: Duration) -> Self {
        Self::MaxAge { max_age }
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Refresh)
    }

    /// Whether a copy of the given age satisfies this requirement.
    pub fn accepts_age(&self, age: Duration) -> bool {
        match self {
            Self::MaxAge { max_age } => age <= *max_age,
            Self::Pinned => true,
            Self::Refresh => false,
        }
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Self::MaxAge {
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

//! Timeout representation for readiness waits
//!
//! The "wait forever" case is a distinct variant rather than a nullable
//! number, so callers cannot conflate it with a zero or missing bound.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bound on a blocking readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeout {
    /// Block until the descriptor becomes ready, however long that takes
    Indefinite,
    /// Wait at most this long for readiness
    Bounded(Duration),
}

impl Timeout {
    /// Default bound applied when a channel is constructed without one
    pub const DEFAULT: Timeout = Timeout::Bounded(Duration::from_secs(1));

    /// True for the indefinite variant
    pub fn is_indefinite(self) -> bool {
        matches!(self, Timeout::Indefinite)
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::DEFAULT
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::Bounded(duration)
    }
}

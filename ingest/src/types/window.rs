//! Adaptive time windows for capped search queries.
//!
//! The upstream search endpoint reports at most [`SEARCH_CAP`] matches per
//! query, so every scope is walked backwards through bounded date windows.
//! The window width adapts to the observed match density: dense periods
//! shrink the interval, sparse periods widen it, always within
//! [`MIN_INTERVAL_MS`] and [`MAX_INTERVAL_MS`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Smallest allowed window width.
pub const MIN_INTERVAL_MS: i64 = DAY_MS;

/// Largest allowed window width.
pub const MAX_INTERVAL_MS: i64 = 30 * DAY_MS;

/// Maximum total matches a single query may report before pagination becomes
/// unreliable upstream.
pub const SEARCH_CAP: u64 = 1000;

/// Match count above which the next window is halved.
pub const NARROW_THRESHOLD: u64 = 500;

/// Match count below which the next window is doubled.
pub const WIDEN_THRESHOLD: u64 = 200;

/// A half-open date range `[start, end)` bounding a single probe query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Builds the window ending at `end` with width `interval_ms`, clamped so
    /// it never starts before `floor`.
    pub fn preceding(end: DateTime<Utc>, interval_ms: i64, floor: DateTime<Utc>) -> Self {
        let start = (end - Duration::milliseconds(interval_ms)).max(floor);
        Self { start, end }
    }
}

/// Per-scope checkpoint that lets a later run resume where this one stopped,
/// keeping the tuned interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveFetchState {
    /// Lower bound of the last fully processed window.
    pub oldest_fetched: DateTime<Utc>,
    /// Window width the scope had tuned itself to.
    pub interval_ms: i64,
}

/// Clamps an interval into the allowed range.
pub fn clamp_interval(interval_ms: i64) -> i64 {
    interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS)
}

/// Halves an interval, flooring at [`MIN_INTERVAL_MS`].
pub fn halve_interval(interval_ms: i64) -> i64 {
    (interval_ms / 2).max(MIN_INTERVAL_MS)
}

/// Adapts the interval for the next window from this window's match count.
///
/// Dense windows (above [`NARROW_THRESHOLD`]) halve the interval, sparse
/// windows (below [`WIDEN_THRESHOLD`]) double it, anything in between leaves
/// it unchanged. The result always stays within bounds.
pub fn adapt_interval(interval_ms: i64, total_matches: u64) -> i64 {
    if total_matches > NARROW_THRESHOLD {
        halve_interval(interval_ms)
    } else if total_matches < WIDEN_THRESHOLD {
        (interval_ms * 2).min(MAX_INTERVAL_MS)
    } else {
        interval_ms
    }
}

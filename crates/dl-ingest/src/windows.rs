//! Date-range partitioning.

use chrono::{Duration, NaiveDate};

/// A closed date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Partition `[start, end]` into contiguous, non-overlapping windows of at
/// most `window_days` each; the last window may be shorter.
///
/// Callers validate `start <= end` and `window_days >= 1` first; this
/// function returns an empty vec for an inverted range rather than panic.
pub fn partition_windows(start: NaiveDate, end: NaiveDate, window_days: i64) -> Vec<Window> {
    let mut windows = Vec::new();
    if start > end || window_days < 1 {
        return windows;
    }

    let mut cursor = start;
    while cursor <= end {
        let window_end = (cursor + Duration::days(window_days - 1)).min(end);
        windows.push(Window {
            start: cursor,
            end: window_end,
        });
        cursor = window_end + Duration::days(1);
    }
    windows
}

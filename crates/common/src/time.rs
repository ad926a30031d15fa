//! Wall-clock helpers for the durable stores.
//!
//! The stores persist absolute deadlines and expiries as unix milliseconds so
//! that state written before a restart stays meaningful after one.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix milliseconds.
///
/// Clamps to zero for clocks set before the epoch rather than failing; the
/// stores treat such timestamps as already expired.
#[must_use]
pub fn unix_ms_now() -> i64 {
    unix_ms(SystemTime::now())
}

/// `at` as unix milliseconds, clamped to zero for pre-epoch times.
#[must_use]
pub fn unix_ms(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// How long from now until the stored `deadline_ms`, if it is still ahead.
#[must_use]
pub fn until_unix_ms(deadline_ms: i64) -> Option<Duration> {
    let now = unix_ms_now();
    if deadline_ms > now {
        Some(Duration::from_millis((deadline_ms - now) as u64))
    } else {
        None
    }
}

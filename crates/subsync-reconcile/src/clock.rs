//! `updated_at` monotonicity guard.
//!
//! A merged record must carry an `updated_at` strictly later than the value
//! it replaces, even when the caller's wall clock is coarse, equal to the
//! previous stamp, or has stepped backwards. The guard never consults the
//! clock itself; the caller supplies `now`.

use chrono::{DateTime, Duration, Utc};

/// Smallest step the guard advances by.
const MIN_STEP_MICROS: i64 = 1;

/// `max(now, previous + 1µs)`.
pub fn next_updated_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::microseconds(MIN_STEP_MICROS);
    if now >= floor {
        now
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn later_clock_is_taken_as_is() {
        assert_eq!(next_updated_at(ts(100), ts(200)), ts(200));
    }

    #[test]
    fn equal_clock_still_advances() {
        let next = next_updated_at(ts(100), ts(100));
        assert!(next > ts(100));
        assert_eq!(next, ts(100) + Duration::microseconds(1));
    }

    #[test]
    fn backwards_clock_never_moves_stamp_back() {
        let next = next_updated_at(ts(500), ts(10));
        assert!(next > ts(500));
    }
}

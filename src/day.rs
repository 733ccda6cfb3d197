//! Day-boundary math.
//!
//! Every daily quota in the engine (campaign counts, mailbox counters)
//! must agree on where "today" starts. This is the single definition;
//! campaign and mailbox code consume it rather than doing their own
//! midnight arithmetic.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

/// UTC instant at which the current calendar day began in the timezone
/// given as a fixed offset from UTC, in minutes.
///
/// Offsets outside ±24h fall back to UTC rather than panicking.
pub fn start_of_day(now: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    let local = now.with_timezone(&offset);
    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    match offset.from_local_datetime(&midnight).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // Fixed offsets have no DST gaps; this arm is unreachable.
        None => now - Duration::hours(24),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn utc_midnight() {
        let now = utc("2025-06-15T13:45:00Z");
        assert_eq!(start_of_day(now, 0), utc("2025-06-15T00:00:00Z"));
    }

    #[test]
    fn positive_offset_shifts_boundary_back() {
        // UTC+2: local day started at 22:00 UTC the previous evening.
        let now = utc("2025-06-15T13:45:00Z");
        assert_eq!(start_of_day(now, 120), utc("2025-06-14T22:00:00Z"));
    }

    #[test]
    fn negative_offset_shifts_boundary_forward() {
        // UTC-5 (New York summer would be -4; fixed offsets don't do DST).
        let now = utc("2025-06-15T13:45:00Z");
        assert_eq!(start_of_day(now, -300), utc("2025-06-15T05:00:00Z"));
    }

    #[test]
    fn early_utc_hour_in_positive_offset_is_already_tomorrow() {
        // 23:30 UTC on the 14th is 01:30 on the 15th in UTC+2, so the
        // local day boundary is 22:00 UTC on the 14th.
        let now = utc("2025-06-14T23:30:00Z");
        assert_eq!(start_of_day(now, 120), utc("2025-06-14T22:00:00Z"));
    }

    #[test]
    fn absurd_offset_falls_back_to_utc() {
        let now = utc("2025-06-15T13:45:00Z");
        assert_eq!(start_of_day(now, 10_000), utc("2025-06-15T00:00:00Z"));
    }

    #[test]
    fn half_hour_offset() {
        // UTC+5:30.
        let now = utc("2025-06-15T13:45:00Z");
        assert_eq!(start_of_day(now, 330), utc("2025-06-14T18:30:00Z"));
    }
}

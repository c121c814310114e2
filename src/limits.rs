use chrono::{DateTime, Utc};

/// Max length of any user profile field (username, first name, nickname).
pub const MAX_PROFILE_FIELD_LEN: usize = 128;

/// Widest bookable range. Slots are one hour by default; day-scale jobs
/// are the ceiling for a single reservation.
pub const MAX_BOOKING_DURATION_HOURS: i64 = 24;

/// Farthest day offset accepted for slot queries, in either direction.
pub const MAX_DAY_OFFSET: i64 = 365;

/// Timestamps outside [2000-01-01, 2200-01-01) are treated as garbage input.
pub fn timestamp_in_valid_range(t: DateTime<Utc>) -> bool {
    const MIN_MS: i64 = 946_684_800_000; // 2000-01-01T00:00:00Z
    const MAX_MS: i64 = 7_258_118_400_000; // 2200-01-01T00:00:00Z
    let ms = t.timestamp_millis();
    (MIN_MS..MAX_MS).contains(&ms)
}

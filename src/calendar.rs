use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::engine::EngineError;
use crate::limits::MAX_DAY_OFFSET;
use crate::model::Span;

/// Business window for slot generation. Default: 1-hour slots, 09:00–21:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    open_hour: u32,
    close_hour: u32,
    slot_minutes: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open_hour: 9,
            close_hour: 21,
            slot_minutes: 60,
        }
    }
}

impl BusinessHours {
    pub fn new(open_hour: u32, close_hour: u32, slot_minutes: u32) -> Result<Self, EngineError> {
        if open_hour >= close_hour || close_hour > 24 {
            return Err(EngineError::Validation("business hours must satisfy open < close <= 24"));
        }
        if slot_minutes == 0 || slot_minutes > 24 * 60 {
            return Err(EngineError::Validation("slot duration must be between 1 minute and 24 hours"));
        }
        Ok(Self {
            open_hour,
            close_hour,
            slot_minutes,
        })
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(self.slot_minutes as i64)
    }

    /// Ordered candidate slot boundaries for `date`, each half-open `[start, end)`.
    /// Pure and deterministic; the last slot is dropped if it would cross closing time.
    pub fn day_slots(&self, date: NaiveDate) -> Vec<Span> {
        let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let close = midnight + Duration::minutes(self.close_hour as i64 * 60);
        let slot = self.slot_duration();

        let mut slots = Vec::new();
        let mut start = midnight + Duration::minutes(self.open_hour as i64 * 60);
        while start + slot <= close {
            slots.push(Span::new(start, start + slot));
            start += slot;
        }
        slots
    }
}

/// A day addressed either as an explicit calendar date or as a signed
/// offset from a reference "today" (0 = today, 1 = tomorrow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySpec {
    Date(NaiveDate),
    Offset(i64),
}

impl DaySpec {
    /// Parse a day path parameter: signed digits → offset, otherwise ISO date.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        if let Ok(offset) = raw.parse::<i64>() {
            return Ok(DaySpec::Offset(offset));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(DaySpec::Date)
            .map_err(|_| EngineError::Validation("day must be YYYY-MM-DD or a signed day offset"))
    }

    /// Resolve to a calendar date. Both representations of the same
    /// underlying date yield the identical slot set downstream.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<NaiveDate, EngineError> {
        match *self {
            DaySpec::Date(date) => Ok(date),
            DaySpec::Offset(offset) => {
                if offset.abs() > MAX_DAY_OFFSET {
                    return Err(EngineError::Validation("day offset out of range"));
                }
                Ok(now.date_naive() + Duration::days(offset))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_hours_make_twelve_slots() {
        let hours = BusinessHours::default();
        let slots = hours.day_slots(date(2099, 1, 10));
        assert_eq!(slots.len(), 12);
        assert_eq!(slots[0].start, Utc.with_ymd_and_hms(2099, 1, 10, 9, 0, 0).unwrap());
        assert_eq!(slots[0].end, Utc.with_ymd_and_hms(2099, 1, 10, 10, 0, 0).unwrap());
        assert_eq!(slots[11].end, Utc.with_ymd_and_hms(2099, 1, 10, 21, 0, 0).unwrap());
    }

    #[test]
    fn slots_are_chronological_and_abutting() {
        let slots = BusinessHours::default().day_slots(date(2099, 1, 10));
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn half_hour_slots() {
        let hours = BusinessHours::new(9, 21, 30).unwrap();
        assert_eq!(hours.day_slots(date(2099, 1, 10)).len(), 24);
    }

    #[test]
    fn partial_trailing_slot_dropped() {
        // 9:00–10:00 window with 45-minute slots fits exactly one slot
        let hours = BusinessHours::new(9, 10, 45).unwrap();
        let slots = hours.day_slots(date(2099, 1, 10));
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].end, Utc.with_ymd_and_hms(2099, 1, 10, 9, 45, 0).unwrap());
    }

    #[test]
    fn invalid_hours_rejected() {
        assert!(BusinessHours::new(21, 9, 60).is_err());
        assert!(BusinessHours::new(9, 25, 60).is_err());
        assert!(BusinessHours::new(9, 21, 0).is_err());
    }

    #[test]
    fn offset_and_date_resolve_identically() {
        let now = Utc.with_ymd_and_hms(2099, 1, 10, 12, 0, 0).unwrap();
        let by_offset = DaySpec::Offset(1).resolve(now).unwrap();
        let by_date = DaySpec::Date(date(2099, 1, 11)).resolve(now).unwrap();
        assert_eq!(by_offset, by_date);

        let hours = BusinessHours::default();
        assert_eq!(hours.day_slots(by_offset), hours.day_slots(by_date));
    }

    #[test]
    fn negative_offset_is_yesterday() {
        let now = Utc.with_ymd_and_hms(2099, 1, 10, 0, 30, 0).unwrap();
        assert_eq!(DaySpec::Offset(-1).resolve(now).unwrap(), date(2099, 1, 9));
    }

    #[test]
    fn offset_out_of_range_rejected() {
        let now = Utc.with_ymd_and_hms(2099, 1, 10, 0, 0, 0).unwrap();
        assert!(DaySpec::Offset(MAX_DAY_OFFSET + 1).resolve(now).is_err());
    }

    #[test]
    fn parse_day_param() {
        assert_eq!(DaySpec::parse("0").unwrap(), DaySpec::Offset(0));
        assert_eq!(DaySpec::parse("-2").unwrap(), DaySpec::Offset(-2));
        assert_eq!(
            DaySpec::parse("2099-01-10").unwrap(),
            DaySpec::Date(date(2099, 1, 10))
        );
        assert!(DaySpec::parse("tomorrow").is_err());
        assert!(DaySpec::parse("2099-13-40").is_err());
    }
}

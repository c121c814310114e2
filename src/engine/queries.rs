use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::calendar::DaySpec;
use crate::model::*;

use super::{Engine, EngineError, validate_range};

impl Engine {
    /// True iff any active booking overlaps `[start, end)`. A pre-commit
    /// advisory check only: `create_booking` re-evaluates under its
    /// write lock, so this result must never be trusted across calls.
    pub async fn has_conflict(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let span = validate_range(start, end)?;
        let state = self.state.read().await;
        Ok(state.active_overlapping(&span).next().is_some())
    }

    /// The day's candidate slots in chronological order with occupancy
    /// flags. A slot is occupied if an active booking intersects it or
    /// its start is not strictly in the future.
    pub async fn day_slots(&self, day: DaySpec) -> Result<Vec<Slot>, EngineError> {
        self.day_slots_at(day, Utc::now()).await
    }

    /// `now` injected for deterministic tests.
    pub async fn day_slots_at(
        &self,
        day: DaySpec,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, EngineError> {
        let date = day.resolve(now)?;
        let candidates = self.hours.day_slots(date);
        let state = self.state.read().await;
        Ok(candidates
            .into_iter()
            .map(|span| Slot {
                start: span.start,
                end: span.end,
                occupied: span.start <= now
                    || state.active_overlapping(&span).next().is_some(),
            })
            .collect())
    }

    /// Bookings sorted by start ascending. `include_past = false` drops
    /// cancelled bookings and bookings that already ended.
    pub async fn list_bookings(&self, filter: BookingFilter) -> Vec<Booking> {
        self.list_bookings_at(filter, Utc::now()).await
    }

    pub async fn list_bookings_at(
        &self,
        filter: BookingFilter,
        now: DateTime<Utc>,
    ) -> Vec<Booking> {
        let state = self.state.read().await;
        state
            .bookings
            .iter()
            .filter(|b| {
                let owned = if filter.include_all {
                    true
                } else {
                    filter.external_id == Some(b.external_user_id)
                };
                owned && (filter.include_past || (b.is_active() && b.span.end > now))
            })
            .cloned()
            .collect()
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let state = self.state.read().await;
        state.booking(id).cloned()
    }

    pub async fn get_user(&self, external_id: ExternalId) -> Option<User> {
        let state = self.state.read().await;
        state.users.get(&external_id).cloned()
    }
}

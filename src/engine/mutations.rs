use chrono::Utc;
use tracing::info;
use ulid::Ulid;

use crate::limits::MAX_PROFILE_FIELD_LEN;
use crate::model::*;

use super::{Engine, EngineError, validate_external_id, validate_range};

fn validate_profile(profile: &Profile) -> Result<(), EngineError> {
    for field in [&profile.username, &profile.first_name, &profile.nickname]
        .into_iter()
        .flatten()
    {
        if field.len() > MAX_PROFILE_FIELD_LEN {
            return Err(EngineError::Validation("profile field too long"));
        }
    }
    Ok(())
}

impl Engine {
    /// Create-or-update a user by external id. Creation synthesizes a
    /// placeholder username; updates are last-write-wins on non-empty
    /// differing fields and write nothing when nothing changed.
    pub async fn upsert_user(
        &self,
        external_id: ExternalId,
        profile: &Profile,
    ) -> Result<User, EngineError> {
        validate_external_id(external_id)?;
        let mut state = self.state.write().await;
        self.upsert_user_locked(&mut state, external_id, profile).await
    }

    /// Upsert under an already-held write lock. Concurrent calls for the
    /// same external id serialize on that lock, so double-creation
    /// cannot happen.
    pub(super) async fn upsert_user_locked(
        &self,
        state: &mut LedgerState,
        external_id: ExternalId,
        profile: &Profile,
    ) -> Result<User, EngineError> {
        validate_profile(profile)?;

        match state.users.get(&external_id).cloned() {
            None => {
                let user = User::new(Ulid::new(), external_id, profile);
                let event = Event::UserCreated {
                    id: user.id,
                    external_id,
                    username: user.username.clone(),
                    first_name: user.first_name.clone(),
                    nickname: user.nickname.clone(),
                };
                self.persist_and_apply(state, &event).await?;
                metrics::counter!(crate::observability::USERS_CREATED_TOTAL).increment(1);
                Ok(user)
            }
            Some(mut user) => {
                if user.apply_profile(profile) {
                    let event = Event::UserUpdated {
                        external_id,
                        username: user.username.clone(),
                        first_name: user.first_name.clone(),
                        nickname: user.nickname.clone(),
                    };
                    self.persist_and_apply(state, &event).await?;
                }
                Ok(user)
            }
        }
    }

    /// Reserve a time window. Validation → user upsert → conflict check →
    /// insert, all inside one write-lock critical section; given
    /// concurrent requests for overlapping windows exactly one wins.
    ///
    /// The user upsert is deliberately NOT rolled back on a conflict: it
    /// is an idempotent side effect of the attempt.
    pub async fn create_booking(&self, req: &BookingRequest) -> Result<Booking, EngineError> {
        validate_external_id(req.external_id)?;
        let span = validate_range(req.start, req.end)?;

        let mut state = self.state.write().await;
        let user = self
            .upsert_user_locked(&mut state, req.external_id, &req.profile)
            .await?;

        if let Some(conflicting) = state.active_overlapping(&span).next().map(|b| b.id) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotConflict(conflicting));
        }

        let booking = Booking {
            id: Ulid::new(),
            user_id: user.id,
            external_user_id: user.external_id,
            span,
            created_at: Utc::now(),
            status: BookingStatus::Active,
        };
        let event = Event::BookingCreated {
            id: booking.id,
            user_id: booking.user_id,
            external_user_id: booking.external_user_id,
            span: booking.span,
            created_at: booking.created_at,
        };
        self.persist_and_apply(&mut state, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            booking = %booking.id,
            external_id = booking.external_user_id,
            start = %booking.span.start,
            end = %booking.span.end,
            "booking created"
        );
        Ok(booking)
    }

    /// Flip a booking to cancelled. `requester` present = self-service
    /// path with ownership enforcement; `None` = trusted (admin) path.
    /// Double-cancel is rejected, not silently accepted.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        requester: Option<ExternalId>,
    ) -> Result<Booking, EngineError> {
        if let Some(requester) = requester {
            validate_external_id(requester)?;
        }

        let mut state = self.state.write().await;
        let (status, owner) = match state.booking(booking_id) {
            None => return Err(EngineError::NotFound(booking_id)),
            Some(b) => (b.status, b.external_user_id),
        };
        if let Some(requester) = requester
            && requester != owner
        {
            return Err(EngineError::Forbidden(booking_id));
        }
        if status == BookingStatus::Cancelled {
            return Err(EngineError::InvalidState(booking_id));
        }

        let event = Event::BookingCancelled { id: booking_id };
        self.persist_and_apply(&mut state, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!(booking = %booking_id, "booking cancelled");
        state
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }
}

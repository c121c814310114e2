mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::calendar::BusinessHours;
use crate::limits::{MAX_BOOKING_DURATION_HOURS, timestamp_in_valid_range};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) struct WalAppend {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalAppend>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = vec![(cmd.event, cmd.response)];
        while let Ok(next) = rx.try_recv() {
            batch.push((next.event, next.response));
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
            .record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// The booking core. One exclusive lock guards the whole ledger: the
/// conflict-check-then-insert sequence of `create_booking` runs inside
/// a single write-lock critical section, so no two concurrent calls for
/// overlapping ranges can both pass the check.
pub struct Engine {
    pub(super) state: RwLock<LedgerState>,
    pub(super) hours: BusinessHours,
    pub(super) wal_tx: mpsc::Sender<WalAppend>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an event directly to the ledger (no locking — caller holds the lock).
fn apply_event(state: &mut LedgerState, event: &Event) {
    match event {
        Event::UserCreated {
            id,
            external_id,
            username,
            first_name,
            nickname,
        } => {
            state.users.insert(
                *external_id,
                User {
                    id: *id,
                    external_id: *external_id,
                    username: username.clone(),
                    first_name: first_name.clone(),
                    nickname: nickname.clone(),
                },
            );
        }
        Event::UserUpdated {
            external_id,
            username,
            first_name,
            nickname,
        } => {
            if let Some(user) = state.users.get_mut(external_id) {
                user.username = username.clone();
                user.first_name = first_name.clone();
                user.nickname = nickname.clone();
            }
        }
        Event::BookingCreated {
            id,
            user_id,
            external_user_id,
            span,
            created_at,
        } => {
            state.insert_booking(Booking {
                id: *id,
                user_id: *user_id,
                external_user_id: *external_user_id,
                span: *span,
                created_at: *created_at,
                status: BookingStatus::Active,
            });
        }
        Event::BookingCancelled { id } => {
            if let Some(booking) = state.booking_mut(*id) {
                booking.status = BookingStatus::Cancelled;
            }
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        hours: BusinessHours,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut state = LedgerState::new();
        for event in &events {
            apply_event(&mut state, event);
        }

        Ok(Self {
            state: RwLock::new(state),
            hours,
            wal_tx,
            notify,
        })
    }

    pub fn business_hours(&self) -> BusinessHours {
        self.hours
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalAppend {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// WAL-append + apply + notify in one call. The in-memory ledger is
    /// only mutated after the event is durable.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut LedgerState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_event(state, event);
        self.notify.send(event);
        Ok(())
    }
}

/// Validate a requested time range and promote it to a `Span`.
pub(super) fn validate_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::Validation("end must be strictly after start"));
    }
    if !timestamp_in_valid_range(start) || !timestamp_in_valid_range(end) {
        return Err(EngineError::Validation("timestamp out of range"));
    }
    if end - start > Duration::hours(MAX_BOOKING_DURATION_HOURS) {
        return Err(EngineError::Validation("range too wide"));
    }
    Ok(Span::new(start, end))
}

pub(super) fn validate_external_id(external_id: ExternalId) -> Result<(), EngineError> {
    if external_id <= 0 {
        return Err(EngineError::Validation("external_id must be a positive integer"));
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Caller-supplied numeric identity (e.g. a chat-platform user id).
/// Trusted by the core; authenticated upstream.
pub type ExternalId = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if the instant falls inside the interval (start inclusive, end exclusive).
    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

/// Identity + display profile. Created lazily on first booking attempt,
/// updated in place afterwards, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Ulid,
    pub external_id: ExternalId,
    pub username: String,
    pub first_name: Option<String>,
    pub nickname: Option<String>,
}

/// Optional display fields a caller may attach to a booking request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub nickname: Option<String>,
}

impl User {
    pub fn new(id: Ulid, external_id: ExternalId, profile: &Profile) -> Self {
        let username = match &profile.username {
            Some(u) if !u.is_empty() => u.clone(),
            _ => format!("user_{external_id}"),
        };
        Self {
            id,
            external_id,
            username,
            first_name: profile.first_name.clone().filter(|s| !s.is_empty()),
            nickname: profile.nickname.clone().filter(|s| !s.is_empty()),
        }
    }

    /// Last-write-wins merge of non-empty differing fields.
    /// Empty or absent inputs never erase stored values.
    /// Returns true if anything actually changed.
    pub fn apply_profile(&mut self, profile: &Profile) -> bool {
        let mut changed = false;
        if let Some(u) = &profile.username
            && !u.is_empty()
            && *u != self.username
        {
            self.username = u.clone();
            changed = true;
        }
        if let Some(f) = &profile.first_name
            && !f.is_empty()
            && Some(f) != self.first_name.as_ref()
        {
            self.first_name = Some(f.clone());
            changed = true;
        }
        if let Some(n) = &profile.nickname
            && !n.is_empty()
            && Some(n) != self.nickname.as_ref()
        {
            self.nickname = Some(n.clone());
            changed = true;
        }
        changed
    }
}

/// One reservation of the resource for one time window.
/// Cancellation flips `status`; rows are never removed (audit history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    /// Denormalized owner external id for ownership checks without a user lookup.
    pub external_user_id: ExternalId,
    #[serde(flatten)]
    pub span: Span,
    pub created_at: DateTime<Utc>,
    pub status: BookingStatus,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserCreated {
        id: Ulid,
        external_id: ExternalId,
        username: String,
        first_name: Option<String>,
        nickname: Option<String>,
    },
    UserUpdated {
        external_id: ExternalId,
        username: String,
        first_name: Option<String>,
        nickname: Option<String>,
    },
    BookingCreated {
        id: Ulid,
        user_id: Ulid,
        external_user_id: ExternalId,
        span: Span,
        created_at: DateTime<Utc>,
    },
    BookingCancelled {
        id: Ulid,
    },
}

/// In-memory booking ledger: the sole shared mutable state of the core.
/// Bookings stay sorted by `span.start` so overlap queries can prune.
#[derive(Debug, Default)]
pub struct LedgerState {
    pub users: std::collections::HashMap<ExternalId, User>,
    pub bookings: Vec<Booking>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Active bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.is_active() && b.span.end > query.start)
    }
}

// ── Query result types ───────────────────────────────────────────

/// One candidate slot of a day's listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub occupied: bool,
}

/// Validated-shape input for `create_booking`: named, typed fields
/// instead of an ad hoc payload map.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub external_id: ExternalId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub profile: Profile,
}

/// Filter for `list_bookings`. `include_all = false` restricts to
/// `external_id`; with no id given the result is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingFilter {
    pub external_id: Option<ExternalId>,
    pub include_past: bool,
    pub include_all: bool,
}

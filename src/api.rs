use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use ulid::Ulid;

use crate::calendar::DaySpec;
use crate::engine::{Engine, EngineError};
use crate::model::{Booking, BookingFilter, BookingRequest, ExternalId, Profile, Slot};

/// Header carrying the caller's numeric identity. Trusted transport:
/// authentication happens upstream, the core only reads the number.
pub const IDENTITY_HEADER: &str = "x-external-id";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub admins: Arc<HashSet<ExternalId>>,
}

pub fn router(engine: Arc<Engine>, admins: HashSet<ExternalId>) -> Router {
    let state = AppState {
        engine,
        admins: Arc::new(admins),
    };
    Router::new()
        .route("/api/slots/:day", get(day_slots))
        .route("/api/book", post(create_booking))
        .route("/api/book/cancel", post(cancel_booking))
        .route("/api/bookings", get(list_bookings))
        .route("/api/is_admin/:external_id", get(is_admin))
        .route("/api/admin/bookings", get(admin_bookings))
        .route("/api/admin/bookings/:id/cancel", post(admin_cancel_booking))
        .with_state(state)
}

// ── Error mapping ────────────────────────────────────────

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn forbidden(message: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::SlotConflict(_) | EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Admin routes require a configured admin id in the identity header.
/// Missing or non-numeric headers fail closed.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<ExternalId, ApiError> {
    let id = headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<ExternalId>().ok());
    match id {
        Some(id) if state.admins.contains(&id) => Ok(id),
        _ => Err(ApiError::forbidden("admin access required")),
    }
}

// ── Handlers ─────────────────────────────────────────────

async fn day_slots(
    State(state): State<AppState>,
    Path(day): Path<String>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let day = DaySpec::parse(&day)?;
    Ok(Json(state.engine.day_slots(day).await?))
}

#[derive(Debug, Deserialize)]
struct BookBody {
    external_id: ExternalId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(flatten)]
    profile: Profile,
}

async fn create_booking(
    State(state): State<AppState>,
    Json(body): Json<BookBody>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let request = BookingRequest {
        external_id: body.external_id,
        start: body.start,
        end: body.end,
        profile: body.profile,
    };
    let booking = state.engine.create_booking(&request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Debug, Deserialize)]
struct CancelBody {
    booking_id: Ulid,
    external_id: ExternalId,
}

/// Self-service cancellation: the ownership check is mandatory here.
async fn cancel_booking(
    State(state): State<AppState>,
    Json(body): Json<CancelBody>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state
        .engine
        .cancel_booking(body.booking_id, Some(body.external_id))
        .await?;
    Ok(Json(booking))
}

#[derive(Debug, Default, Deserialize)]
struct BookingsQuery {
    external_id: Option<ExternalId>,
    #[serde(default)]
    include_past: bool,
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingsQuery>,
) -> Json<Vec<Booking>> {
    let filter = BookingFilter {
        external_id: query.external_id,
        include_past: query.include_past,
        include_all: false,
    };
    Json(state.engine.list_bookings(filter).await)
}

async fn is_admin(
    State(state): State<AppState>,
    Path(external_id): Path<ExternalId>,
) -> Json<serde_json::Value> {
    Json(json!({ "is_admin": state.admins.contains(&external_id) }))
}

/// All users' upcoming active bookings, for the moderation dashboard.
async fn admin_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Booking>>, ApiError> {
    require_admin(&state, &headers)?;
    let filter = BookingFilter {
        external_id: None,
        include_past: false,
        include_all: true,
    };
    Ok(Json(state.engine.list_bookings(filter).await))
}

/// Trusted cancellation path: no ownership check, state check still applies.
async fn admin_cancel_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Ulid>,
) -> Result<Json<Booking>, ApiError> {
    require_admin(&state, &headers)?;
    let booking = state.engine.cancel_booking(id, None).await?;
    Ok(Json(booking))
}

use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input; the message names the offending field.
    Validation(&'static str),
    /// Requested range overlaps the identified active booking.
    SlotConflict(Ulid),
    NotFound(Ulid),
    /// Self-service cancel with a non-owner identity.
    Forbidden(Ulid),
    /// Operation not valid for the booking's current status.
    InvalidState(Ulid),
    /// Underlying persistence unavailable. The only fatal category.
    Storage(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::SlotConflict(id) => write!(f, "time window conflicts with booking: {id}"),
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Forbidden(id) => write!(f, "booking {id} belongs to another user"),
            EngineError::InvalidState(id) => write!(f, "booking {id} is already cancelled"),
            EngineError::Storage(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

use uuid::Uuid;

use crate::conflict::Conflict;
use crate::hold::LockId;

/// Failures reported by a `ReservationStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A storage-enforced uniqueness rule rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Backend(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Slot already taken by {} {}", .0.source, .0.id)]
    ExactConflict(Conflict),
    #[error("Slot overlaps {} existing reservation(s)", .0.len())]
    OverlapConflict(Vec<Conflict>),
    #[error("Hold {0} has expired")]
    HoldExpired(LockId),
    #[error("{entity} is already {status}")]
    AlreadyTerminal { entity: String, status: String },
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },
    /// Lost an insert race at the storage constraint. Clients see this exactly like `ExactConflict`.
    #[error("Slot was claimed by a concurrent request")]
    TransientStorageRace,
    #[error("Slot was booked concurrently")]
    ConcurrentBooking { booking_id: Option<Uuid> },
    #[error(transparent)]
    Storage(#[from] StoreError),
    /// A committed state that breaks an invariant, e.g. a confirmed hold without its booking.
    #[error("Integrity violation: {0}")]
    Integrity(String),
}

pub type ReservationResult<T> = Result<T, ReservationError>;

impl ReservationError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::Validation(_) => "validation_error",
            ReservationError::NotFound(_) => "not_found",
            ReservationError::Forbidden(_) => "forbidden",
            ReservationError::ExactConflict(_)
            | ReservationError::TransientStorageRace
            | ReservationError::ConcurrentBooking { .. } => "slot_taken",
            ReservationError::OverlapConflict(_) => "slot_overlaps",
            ReservationError::HoldExpired(_) => "hold_expired",
            ReservationError::AlreadyTerminal { .. } => "already_terminal",
            ReservationError::VersionConflict { .. } => "version_conflict",
            ReservationError::Storage(StoreError::Unavailable(_)) => "storage_unavailable",
            ReservationError::Storage(_) => "storage_error",
            ReservationError::Integrity(_) => "integrity_violation",
        }
    }

    /// Fatal errors page an operator; everything else is an expected outcome for the client.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReservationError::Storage(_) | ReservationError::Integrity(_))
    }

    pub fn is_slot_taken(&self) -> bool {
        self.code() == "slot_taken"
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ReservationError::Validation(msg.into())
    }
}

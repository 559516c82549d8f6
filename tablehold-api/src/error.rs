use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tablehold_core::{ReservationError, StoreError};

pub const SLOT_TAKEN_MESSAGE: &str = "This table was just taken";
pub const HOLD_EXPIRED_MESSAGE: &str = "Your hold expired, please try again";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),
    #[error("Not allowed: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Reservation(err) => match err {
                ReservationError::Validation(_) => StatusCode::BAD_REQUEST,
                ReservationError::NotFound(_) => StatusCode::NOT_FOUND,
                ReservationError::Forbidden(_) => StatusCode::FORBIDDEN,
                ReservationError::HoldExpired(_) => StatusCode::GONE,
                ReservationError::ExactConflict(_)
                | ReservationError::OverlapConflict(_)
                | ReservationError::TransientStorageRace
                | ReservationError::ConcurrentBooking { .. }
                | ReservationError::AlreadyTerminal { .. }
                | ReservationError::VersionConflict { .. } => StatusCode::CONFLICT,
                ReservationError::Storage(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                ReservationError::Storage(_) | ReservationError::Integrity(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::BadRequest(_) => "validation_error",
            AppError::RateLimited => "rate_limited",
            AppError::Reservation(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Reservation(err) if err.is_slot_taken() => SLOT_TAKEN_MESSAGE.to_string(),
            AppError::Reservation(ReservationError::HoldExpired(_)) => HOLD_EXPIRED_MESSAGE.to_string(),
            AppError::Reservation(ReservationError::Storage(StoreError::Unavailable(_))) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Reservation(err) if err.is_fatal() => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::Reservation(ReservationError::ExactConflict(hit)) => Some(json!({ "conflicts": [hit] })),
            AppError::Reservation(ReservationError::OverlapConflict(hits)) => Some(json!({ "conflicts": hits })),
            AppError::Reservation(ReservationError::ConcurrentBooking { booking_id }) => {
                Some(json!({ "booking_id": booking_id }))
            }
            AppError::Reservation(ReservationError::VersionConflict { expected, actual }) => {
                Some(json!({ "expected_version": expected, "current_version": actual }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Reservation(err) = &self {
            if err.is_fatal() {
                tracing::error!(page = true, code = err.code(), "Reservation failure: {}", err);
            }
        }

        let mut body = json!({
            "error": self.code(),
            "message": self.message(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (self.status(), Json(body)).into_response()
    }
}

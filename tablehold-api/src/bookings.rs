use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tablehold_booking::NewBooking;
use tablehold_core::{Booking, BookingChange, BookingUpdate, ContactDetails, PricingSnapshot};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Identity;
use crate::slot_input::SlotInput;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    #[serde(flatten)]
    pub slot: SlotInput,
    pub guest_count: u16,
    /// Staff may book on behalf of a customer.
    pub user_id: Option<String>,
    #[serde(default)]
    pub contact: ContactDetails,
    pub pricing: Option<PricingSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    pub expected_version: i64,
    #[serde(flatten)]
    pub change: BookingChange,
    pub note: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let user_id = match req.user_id {
        Some(other) if other != identity.user_id => {
            identity.require_staff()?;
            other
        }
        _ => identity.user_id.clone(),
    };

    let booking = state
        .services
        .bookings
        .create_booking(NewBooking {
            slot: req.slot.into_slot()?,
            guest_count: req.guest_count,
            user_id,
            contact: req.contact,
            pricing: req.pricing,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.services.bookings.get_booking(booking_id).await?;
    identity.require_owner_or_staff(&booking.user_id)?;
    Ok(Json(booking))
}

/// PATCH /v1/bookings/{id}
/// Every change is version-checked against `expected_version`.
pub async fn update_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    if req.change.is_staff_only() {
        identity.require_staff()?;
    } else if !identity.is_staff() {
        let current = state.services.bookings.get_booking(booking_id).await?;
        identity.require_owner_or_staff(&current.user_id)?;
    }

    let booking = state
        .services
        .bookings
        .update_with_version(
            booking_id,
            req.expected_version,
            BookingUpdate {
                change: req.change,
                actor: identity.user_id,
                note: req.note,
            },
        )
        .await?;
    Ok(Json(booking))
}

/// DELETE /v1/bookings/{id}
pub async fn delete_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(booking_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    identity.require_staff()?;
    state.services.bookings.delete_booking(booking_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

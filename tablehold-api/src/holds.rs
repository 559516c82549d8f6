use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tablehold_booking::{HoldRequest, HoldStatus};
use tablehold_core::{Booking, BookingOverrides, ContactDetails, HoldMetadata, LockId, PricingSnapshot};

use crate::error::AppError;
use crate::middleware::Identity;
use crate::slot_input::SlotInput;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    #[serde(flatten)]
    pub slot: SlotInput,
    pub guest_count: u16,
    pub hold_minutes: Option<i64>,
    #[serde(default)]
    pub contact: ContactDetails,
    pub pricing: Option<PricingSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendHoldRequest {
    pub minutes: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmHoldRequest {
    pub guest_count: Option<u16>,
    #[serde(default)]
    pub contact: ContactDetails,
    pub pricing: Option<PricingSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub lock_id: String,
    pub status: String,
    pub restaurant_id: String,
    pub table_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub guest_count: u16,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub remaining_seconds: i64,
}

impl From<HoldStatus> for HoldResponse {
    fn from(status: HoldStatus) -> Self {
        let lock = status.lock;
        Self {
            lock_id: lock.id.to_string(),
            status: lock.status.to_string(),
            restaurant_id: lock.slot.restaurant_id,
            table_id: lock.slot.table_id,
            date: lock.slot.date,
            start_time: lock.slot.start_time.to_string(),
            end_time: lock.slot.end_time.to_string(),
            guest_count: lock.guest_count,
            expires_at: lock.expires_at,
            confirmed_at: lock.confirmed_at,
            is_expired: status.is_expired,
            remaining_seconds: status.remaining_seconds,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/holds
pub async fn create_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), AppError> {
    let slot = req.slot.into_slot()?;
    let lock = state
        .services
        .locks
        .create_hold(HoldRequest {
            slot,
            guest_count: req.guest_count,
            user_id: identity.user_id,
            hold_minutes: req.hold_minutes,
            metadata: HoldMetadata {
                contact: req.contact,
                pricing: req.pricing,
            },
        })
        .await?;

    let status = state.services.locks.get_status(&lock.id).await?;
    Ok((StatusCode::CREATED, Json(status.into())))
}

/// GET /v1/holds/{lock_id}
pub async fn get_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(lock_id): Path<String>,
) -> Result<Json<HoldResponse>, AppError> {
    let lock_id = LockId::parse(&lock_id)?;
    let lock = state.services.locks.get_lock(&lock_id).await?;
    identity.require_owner_or_staff(&lock.user_id)?;
    let status = state.services.locks.get_status(&lock_id).await?;
    Ok(Json(status.into()))
}

/// DELETE /v1/holds/{lock_id}
pub async fn release_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(lock_id): Path<String>,
) -> Result<Json<HoldResponse>, AppError> {
    let lock_id = LockId::parse(&lock_id)?;
    state.services.locks.release(&lock_id, &identity.user_id).await?;
    let status = state.services.locks.get_status(&lock_id).await?;
    Ok(Json(status.into()))
}

/// POST /v1/holds/{lock_id}/extend
pub async fn extend_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(lock_id): Path<String>,
    Json(req): Json<ExtendHoldRequest>,
) -> Result<Json<HoldResponse>, AppError> {
    let lock_id = LockId::parse(&lock_id)?;
    state
        .services
        .locks
        .extend(&lock_id, &identity.user_id, req.minutes)
        .await?;
    let status = state.services.locks.get_status(&lock_id).await?;
    Ok(Json(status.into()))
}

/// POST /v1/holds/{lock_id}/confirm
/// Safe to retry: a hold that is already confirmed returns its booking.
pub async fn confirm_hold(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(lock_id): Path<String>,
    Json(req): Json<ConfirmHoldRequest>,
) -> Result<Json<Booking>, AppError> {
    let lock_id = LockId::parse(&lock_id)?;
    let overrides = BookingOverrides {
        guest_count: req.guest_count,
        contact: req.contact,
        pricing: req.pricing,
    };
    let booking = state
        .services
        .confirmations
        .confirm_hold(&lock_id, &identity.user_id, overrides)
        .await?;
    Ok(Json(booking))
}

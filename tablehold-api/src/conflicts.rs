use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use tablehold_booking::ConflictCheck;
use tablehold_core::{ConflictReport, LockId};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Identity;
use crate::slot_input::SlotInput;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckConflictsRequest {
    #[serde(flatten)]
    pub slot: SlotInput,
    pub exclude_lock_id: Option<String>,
    pub exclude_booking_id: Option<Uuid>,
}

/// POST /v1/conflicts/check
/// Advisory only. The score ranks options for display and never decides a write.
pub async fn check_conflicts(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Json(req): Json<CheckConflictsRequest>,
) -> Result<Json<ConflictReport>, AppError> {
    let exclude_lock = req.exclude_lock_id.as_deref().map(LockId::parse).transpose()?;
    let check = ConflictCheck {
        slot: req.slot.into_slot()?,
        exclude_lock,
        exclude_booking: req.exclude_booking_id,
    };
    let report = state.services.detector.check(&check).await?;
    Ok(Json(report))
}

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use tablehold_booking::{ResolutionAction, ResolutionOutcome, ResolutionTarget, ResolveRequest};

use crate::error::AppError;
use crate::middleware::Identity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveConflictRequest {
    pub target: ResolutionTarget,
    #[serde(flatten)]
    pub action: ResolutionAction,
    pub reason: String,
    pub expected_version: Option<i64>,
}

/// POST /v1/admin/conflicts/resolve
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ResolveConflictRequest>,
) -> Result<Json<ResolutionOutcome>, AppError> {
    identity.require_staff()?;
    let outcome = state
        .services
        .resolution
        .resolve(ResolveRequest {
            target: req.target,
            action: req.action,
            reason: req.reason,
            operator: identity.user_id,
            expected_version: req.expected_version,
        })
        .await?;
    Ok(Json(outcome))
}

use axum::{extract::State, Json};
use tablehold_booking::SweepReport;

use crate::error::AppError;
use crate::state::AppState;

/// POST /internal/sweep
/// Called by the external scheduler; authenticated by `x-sweep-secret`.
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    let report = state.services.sweeper.run().await?;
    Ok(Json(report))
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tablehold_core::{
    Booking, BookingChange, BookingUpdate, Clock, Lock, LockId, LockStatus, ReservationError,
    ReservationResult, ReservationStore, TimeOfDay,
};
use tracing::info;
use uuid::Uuid;

use crate::occ::BookingOccEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResolutionTarget {
    Booking(Uuid),
    Lock(LockId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolutionAction {
    Cancel,
    Reschedule {
        date: NaiveDate,
        start_time: TimeOfDay,
        end_time: TimeOfDay,
    },
    /// Keep the booking and record the conflict as an accepted exception.
    Override,
    /// Holds only: end the hold before its TTL.
    Expire,
}

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub target: ResolutionTarget,
    pub action: ResolutionAction,
    pub reason: String,
    pub operator: String,
    /// Defaults to the booking's current version.
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Booking(Booking),
    Lock(Lock),
}

/// Operator remediation for conflicts found after the fact. Booking changes go
/// through the OCC engine like any other mutation.
#[derive(Clone)]
pub struct ResolutionService {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    bookings: BookingOccEngine,
}

impl ResolutionService {
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>, bookings: BookingOccEngine) -> Self {
        Self { store, clock, bookings }
    }

    pub async fn resolve(&self, request: ResolveRequest) -> ReservationResult<ResolutionOutcome> {
        if request.reason.trim().is_empty() {
            return Err(ReservationError::Validation("a resolution reason is required".to_string()));
        }
        info!(
            operator = %request.operator,
            target = ?request.target,
            action = ?request.action,
            "Resolving conflict: {}",
            request.reason
        );

        match (&request.target, &request.action) {
            (ResolutionTarget::Booking(id), action) => {
                let change = match action {
                    ResolutionAction::Cancel => BookingChange::Cancel {
                        reason: request.reason.clone(),
                    },
                    ResolutionAction::Reschedule {
                        date,
                        start_time,
                        end_time,
                    } => BookingChange::Reschedule {
                        date: *date,
                        start_time: *start_time,
                        end_time: *end_time,
                    },
                    ResolutionAction::Override => BookingChange::Acknowledge {
                        reason: request.reason.clone(),
                    },
                    ResolutionAction::Expire => {
                        return Err(ReservationError::Validation(
                            "expire applies to holds only".to_string(),
                        ))
                    }
                };
                self.resolve_booking(*id, change, &request).await
            }
            (ResolutionTarget::Lock(id), ResolutionAction::Cancel) => {
                self.end_lock(id, LockStatus::Released, &request).await
            }
            (ResolutionTarget::Lock(id), ResolutionAction::Expire) => {
                self.end_lock(id, LockStatus::Expired, &request).await
            }
            (ResolutionTarget::Lock(_), _) => Err(ReservationError::Validation(
                "holds can only be cancelled or expired".to_string(),
            )),
        }
    }

    async fn resolve_booking(
        &self,
        id: Uuid,
        change: BookingChange,
        request: &ResolveRequest,
    ) -> ReservationResult<ResolutionOutcome> {
        let expected_version = match request.expected_version {
            Some(v) => v,
            None => self.bookings.get_booking(id).await?.version,
        };
        let note = matches!(change, BookingChange::Reschedule { .. }).then(|| request.reason.clone());
        let update = BookingUpdate {
            change,
            actor: request.operator.clone(),
            note,
        };
        let booking = self.bookings.update_with_version(id, expected_version, update).await?;
        Ok(ResolutionOutcome::Booking(booking))
    }

    /// Ending a hold that is already in the requested state is a no-op.
    async fn end_lock(
        &self,
        id: &LockId,
        target: LockStatus,
        request: &ResolveRequest,
    ) -> ReservationResult<ResolutionOutcome> {
        let now = self.clock.now();
        if let Some(lock) = self
            .store
            .transition_lock(id, LockStatus::Active, target, now)
            .await?
        {
            info!(
                lock_id = %id,
                operator = %request.operator,
                reason = %request.reason,
                "Hold force-{} by operator",
                target
            );
            return Ok(ResolutionOutcome::Lock(lock));
        }

        let lock = self
            .store
            .get_lock(id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("hold {}", id)))?;
        if lock.status == target {
            return Ok(ResolutionOutcome::Lock(lock));
        }
        Err(ReservationError::AlreadyTerminal {
            entity: format!("hold {}", id),
            status: lock.status.to_string(),
        })
    }
}

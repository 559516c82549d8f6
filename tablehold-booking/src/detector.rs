use std::sync::Arc;
use tablehold_core::conflict::{self, ConflictQuery};
use tablehold_core::{
    Clock, ConflictReport, LockId, ReservationError, ReservationResult, ReservationStore, Slot,
};
use tracing::debug;
use uuid::Uuid;

/// A slot to test, minus the entities the caller already owns.
#[derive(Debug, Clone)]
pub struct ConflictCheck {
    pub slot: Slot,
    pub exclude_lock: Option<LockId>,
    pub exclude_booking: Option<Uuid>,
}

impl ConflictCheck {
    pub fn slot(slot: Slot) -> Self {
        Self {
            slot,
            exclude_lock: None,
            exclude_booking: None,
        }
    }
}

/// Read-only conflict queries over live bookings and live holds.
///
/// The matching itself is `tablehold_core::conflict::detect`, the same function the
/// stores run inside the confirmation transaction.
#[derive(Clone)]
pub struct ConflictDetector {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn check(&self, check: &ConflictCheck) -> ReservationResult<ConflictReport> {
        let slot = &check.slot;
        let occupants = self
            .store
            .slot_occupants(&slot.restaurant_id, &slot.table_id, slot.date)
            .await?;

        let report = conflict::detect(
            &occupants,
            &ConflictQuery {
                date: slot.date,
                window: slot.window(),
                exclude_lock: check.exclude_lock.as_ref(),
                exclude_booking: check.exclude_booking,
                include_locks: true,
            },
            self.clock.now(),
        );

        debug!(
            restaurant_id = %slot.restaurant_id,
            table_id = %slot.table_id,
            exact = report.exact.len(),
            overlapping = report.overlapping.len(),
            score = report.availability_score,
            "Conflict check for {}",
            slot
        );
        Ok(report)
    }

    /// Only an exact hit is an error here; overlaps are left to the caller.
    pub async fn ensure_no_exact(&self, check: &ConflictCheck) -> ReservationResult<ConflictReport> {
        let report = self.check(check).await?;
        if let Some(hit) = report.first_exact() {
            return Err(ReservationError::ExactConflict(hit.clone()));
        }
        Ok(report)
    }

    /// Exact hits first, then overlaps. Used by every path that writes a booking slot directly.
    pub async fn ensure_clear(&self, check: &ConflictCheck) -> ReservationResult<ConflictReport> {
        let report = self.ensure_no_exact(check).await?;
        if report.has_overlap() {
            return Err(ReservationError::OverlapConflict(report.overlapping));
        }
        Ok(report)
    }
}

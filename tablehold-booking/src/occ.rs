use std::sync::Arc;
use tablehold_core::notify::Notifier;
use tablehold_core::{
    Booking, BookingChange, BookingUpdate, Clock, ContactDetails, PricingSnapshot,
    ReservationError, ReservationResult, ReservationStore, Slot, StoreError,
};
use tablehold_shared::models::events::NotificationKind;
use tracing::{info, warn};
use uuid::Uuid;

use crate::detector::{ConflictCheck, ConflictDetector};
use crate::dispatch;
use crate::locks::validate_guests;

/// A booking made without a hold.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub slot: Slot,
    pub guest_count: u16,
    pub user_id: String,
    pub contact: ContactDetails,
    pub pricing: Option<PricingSnapshot>,
}

/// Version-checked reads and writes of bookings. Every mutation after creation goes
/// through `update_with_version`.
#[derive(Clone)]
pub struct BookingOccEngine {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    detector: ConflictDetector,
    notifier: Arc<dyn Notifier>,
}

impl BookingOccEngine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        detector: ConflictDetector,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            clock,
            detector,
            notifier,
        }
    }

    pub async fn create_booking(&self, request: NewBooking) -> ReservationResult<Booking> {
        validate_guests(request.guest_count)?;
        if request.user_id.trim().is_empty() {
            return Err(ReservationError::Validation("user_id is required".to_string()));
        }

        self.detector.ensure_clear(&ConflictCheck::slot(request.slot.clone())).await?;

        let booking = Booking::new_pending(
            request.slot,
            request.user_id,
            request.guest_count,
            request.contact,
            request.pricing,
            self.clock.now(),
        );

        match self.store.insert_booking(&booking).await {
            Ok(()) => {
                info!(
                    booking_id = %booking.id,
                    restaurant_id = %booking.slot.restaurant_id,
                    table_id = %booking.slot.table_id,
                    "Pending booking created for {}",
                    booking.slot
                );
                Ok(booking)
            }
            Err(StoreError::UniqueViolation(constraint)) => {
                warn!(%constraint, "Direct booking lost insert race on {}", booking.slot);
                Err(ReservationError::TransientStorageRace)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_booking(&self, id: Uuid) -> ReservationResult<Booking> {
        self.store
            .get_booking(id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("booking {}", id)))
    }

    pub async fn update_with_version(
        &self,
        id: Uuid,
        expected_version: i64,
        update: BookingUpdate,
    ) -> ReservationResult<Booking> {
        // 1. Read and compare
        let current = self.get_booking(id).await?;
        if current.version != expected_version {
            return Err(ReservationError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        // 2. Build the next version
        let next = current.apply(&update, self.clock.now())?;
        if next.slot != current.slot {
            self.detector
                .ensure_clear(&ConflictCheck {
                    slot: next.slot.clone(),
                    exclude_lock: None,
                    exclude_booking: Some(id),
                })
                .await?;
        }

        // 3. Compare-and-swap
        match self.store.compare_and_swap_booking(&next, expected_version).await {
            Ok(true) => {}
            Ok(false) => {
                let actual = self.get_booking(id).await?.version;
                return Err(ReservationError::VersionConflict {
                    expected: expected_version,
                    actual,
                });
            }
            Err(StoreError::UniqueViolation(constraint)) => {
                warn!(booking_id = %id, %constraint, "Booking update lost slot race");
                return Err(ReservationError::TransientStorageRace);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            booking_id = %id,
            version = next.version,
            actor = %update.actor,
            "Booking {}",
            update.change.action()
        );

        // 4. Notify
        let notice = match &update.change {
            BookingChange::Confirm => Some((NotificationKind::Confirmed, None)),
            BookingChange::Reject { reason } => Some((NotificationKind::Rejected, Some(reason.clone()))),
            BookingChange::Cancel { reason } => Some((NotificationKind::Cancelled, Some(reason.clone()))),
            _ => None,
        };
        if let Some((kind, reason)) = notice {
            let event = dispatch::notification(kind, &next, reason, next.updated_at);
            dispatch::notify_best_effort(self.notifier.as_ref(), event).await;
        }

        Ok(next)
    }

    /// Only cancelled or completed bookings may be deleted.
    pub async fn delete_booking(&self, id: Uuid) -> ReservationResult<()> {
        let current = self.get_booking(id).await?;
        if !current.status.is_terminal() {
            return Err(ReservationError::Validation(format!(
                "booking {} is {}; only cancelled or completed bookings can be deleted",
                id, current.status
            )));
        }
        if !self.store.delete_terminal_booking(id).await? {
            return Err(ReservationError::NotFound(format!("booking {}", id)));
        }
        info!(booking_id = %id, "Booking deleted");
        Ok(())
    }
}

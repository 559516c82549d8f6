use std::sync::Arc;
use tablehold_core::notify::Notifier;
use tablehold_core::usage::UsageCounter;
use tablehold_core::{
    Booking, BookingOverrides, Clock, ConfirmOutcome, ConfirmationPlan, LockId, LockStatus,
    ReservationError, ReservationResult, ReservationStore,
};
use tablehold_shared::models::events::NotificationKind;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatch;
use crate::locks::validate_guests;

/// Turns an active hold into a confirmed booking.
///
/// The conversion itself is `ReservationStore::confirm_hold`, one storage transaction.
/// Usage accounting and notification run after it commits and cannot undo it.
#[derive(Clone)]
pub struct ConfirmationCoordinator {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    usage: Arc<dyn UsageCounter>,
    notifier: Arc<dyn Notifier>,
}

impl ConfirmationCoordinator {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        usage: Arc<dyn UsageCounter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            clock,
            usage,
            notifier,
        }
    }

    pub async fn confirm_hold(
        &self,
        lock_id: &LockId,
        user_id: &str,
        overrides: BookingOverrides,
    ) -> ReservationResult<Booking> {
        if let Some(count) = overrides.guest_count {
            validate_guests(count)?;
        }

        let plan = ConfirmationPlan {
            lock_id: lock_id.clone(),
            user_id: user_id.to_string(),
            booking_id: Uuid::new_v4(),
            overrides,
            now: self.clock.now(),
        };

        match self.store.confirm_hold(&plan).await? {
            ConfirmOutcome::Confirmed { booking, lock } => {
                info!(
                    lock_id = %lock.id,
                    booking_id = %booking.id,
                    restaurant_id = %booking.slot.restaurant_id,
                    table_id = %booking.slot.table_id,
                    "Hold confirmed into booking for {}",
                    booking.slot
                );
                self.after_commit(&booking).await;
                Ok(booking)
            }
            ConfirmOutcome::AlreadyConfirmed { booking: Some(booking), lock } => {
                info!(lock_id = %lock.id, booking_id = %booking.id, "Confirmation retried, returning existing booking");
                Ok(booking)
            }
            ConfirmOutcome::AlreadyConfirmed { booking: None, lock } => {
                error!(
                    page = true,
                    lock_id = %lock.id,
                    "Hold is confirmed but has no booking"
                );
                Err(ReservationError::Integrity(format!(
                    "hold {} is confirmed without a booking",
                    lock.id
                )))
            }
            ConfirmOutcome::Expired(lock) => {
                info!(lock_id = %lock.id, "Confirmation refused, hold expired at {}", lock.expires_at);
                Err(ReservationError::HoldExpired(lock.id))
            }
            ConfirmOutcome::NotActive(lock) => match lock.status {
                LockStatus::Expired => Err(ReservationError::HoldExpired(lock.id)),
                status => Err(ReservationError::AlreadyTerminal {
                    entity: format!("hold {}", lock.id),
                    status: status.to_string(),
                }),
            },
            ConfirmOutcome::NotOwner(lock) => Err(ReservationError::Forbidden(format!(
                "hold {} belongs to another user",
                lock.id
            ))),
            ConfirmOutcome::Conflict(hit) => {
                let booking_id = hit.as_ref().and_then(|c| c.booking_id());
                warn!(
                    lock_id = %lock_id,
                    conflicting_booking = ?booking_id,
                    "Confirmation aborted, slot was booked outside the hold"
                );
                Err(ReservationError::ConcurrentBooking { booking_id })
            }
            ConfirmOutcome::Missing => Err(ReservationError::NotFound(format!("hold {}", lock_id))),
        }
    }

    async fn after_commit(&self, booking: &Booking) {
        let now = self.clock.now();
        dispatch::record_usage_best_effort(self.usage.as_ref(), booking, now).await;
        let event = dispatch::notification(NotificationKind::Confirmed, booking, None, now);
        dispatch::notify_best_effort(self.notifier.as_ref(), event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tablehold_core::notify::RecordingNotifier;
    use tablehold_core::usage::{usage_period, InMemoryUsageCounter};
    use tablehold_core::{ContactDetails, HoldMetadata, Lock, ManualClock, Slot};
    use tablehold_shared::Masked;
    use tablehold_store::InMemoryReservationStore;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryReservationStore>,
        usage: Arc<InMemoryUsageCounter>,
        notifier: Arc<RecordingNotifier>,
        coordinator: ConfirmationCoordinator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap()));
        let store = Arc::new(InMemoryReservationStore::new());
        let usage = Arc::new(InMemoryUsageCounter::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = ConfirmationCoordinator::new(store.clone(), clock.clone(), usage.clone(), notifier.clone());
        Fixture {
            clock,
            store,
            usage,
            notifier,
            coordinator,
        }
    }

    async fn held(f: &Fixture) -> Lock {
        let metadata = HoldMetadata {
            contact: ContactDetails {
                name: Some("Ada".into()),
                email: Some(Masked::new("ada@example.com".to_string())),
                ..ContactDetails::default()
            },
            pricing: None,
        };
        let slot = Slot::new(
            "r1",
            "t4",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            "19:00".parse().unwrap(),
            "20:30".parse().unwrap(),
        )
        .unwrap();
        let lock = Lock::new(slot, "u1".into(), 2, Duration::minutes(5), metadata, f.clock.now());
        f.store.insert_lock(&lock).await.unwrap();
        lock
    }

    #[tokio::test]
    async fn test_overrides_win_over_hold_snapshot() {
        let f = fixture();
        let lock = held(&f).await;
        let overrides = BookingOverrides {
            guest_count: Some(4),
            contact: ContactDetails {
                name: Some("Ada L.".into()),
                ..ContactDetails::default()
            },
            pricing: None,
        };

        let booking = f.coordinator.confirm_hold(&lock.id, "u1", overrides).await.unwrap();
        assert_eq!(booking.guest_count, 4);
        assert_eq!(booking.contact.name.as_deref(), Some("Ada L."));
        assert_eq!(booking.contact.email.as_ref().map(|e| e.expose().as_str()), Some("ada@example.com"));
        assert_eq!(booking.history[0].action, "created_from_hold");
        assert_eq!(booking.history[0].details["lock_id"], lock.id.as_str());
    }

    #[tokio::test]
    async fn test_side_effects_follow_commit() {
        let f = fixture();
        let lock = held(&f).await;
        let booking = f.coordinator.confirm_hold(&lock.id, "u1", BookingOverrides::default()).await.unwrap();

        assert_eq!(f.usage.count("r1", &usage_period(f.clock.now())), 1);
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Confirmed);
        assert_eq!(sent[0].booking_id, booking.id);
    }

    #[tokio::test]
    async fn test_failed_side_effects_do_not_fail_confirmation() {
        let f = fixture();
        f.usage.set_failing(true);
        f.notifier.set_failing(true);
        let lock = held(&f).await;

        let booking = f.coordinator.confirm_hold(&lock.id, "u1", BookingOverrides::default()).await.unwrap();
        assert_eq!(f.store.get_booking(booking.id).await.unwrap(), Some(booking));
    }

    #[tokio::test]
    async fn test_retry_returns_existing_booking() {
        let f = fixture();
        let lock = held(&f).await;
        let first = f.coordinator.confirm_hold(&lock.id, "u1", BookingOverrides::default()).await.unwrap();
        let second = f.coordinator.confirm_hold(&lock.id, "u1", BookingOverrides::default()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(f.store.booking_count().await, 1);
        assert_eq!(f.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_user_is_forbidden() {
        let f = fixture();
        let lock = held(&f).await;
        let err = f.coordinator.confirm_hold(&lock.id, "u2", BookingOverrides::default()).await.unwrap_err();
        assert!(matches!(err, ReservationError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_direct_booking_blocks_confirmation() {
        let f = fixture();
        let lock = held(&f).await;
        let direct = Booking::new_pending(lock.slot.clone(), "u9".into(), 2, ContactDetails::default(), None, f.clock.now());
        f.store.insert_booking(&direct).await.unwrap();

        let err = f.coordinator.confirm_hold(&lock.id, "u1", BookingOverrides::default()).await.unwrap_err();
        match err {
            ReservationError::ConcurrentBooking { booking_id } => assert_eq!(booking_id, Some(direct.id)),
            other => panic!("unexpected error: {:?}", other),
        }
        let untouched = f.store.get_lock(&lock.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, LockStatus::Active);
    }
}

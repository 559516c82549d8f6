use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingOverrides, HistoryEntry};
use crate::conflict::{Conflict, SlotOccupants};
use crate::error::StoreResult;
use crate::hold::{Lock, LockId, LockStatus};

/// Input to the lock-to-booking transaction.
#[derive(Debug, Clone)]
pub struct ConfirmationPlan {
    pub lock_id: LockId,
    pub user_id: String,
    pub booking_id: Uuid,
    pub overrides: BookingOverrides,
    pub now: DateTime<Utc>,
}

/// What the confirmation transaction decided. Only `Confirmed` commits a new booking;
/// `Expired` commits the lock's transition to expired and nothing else.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Confirmed { booking: Booking, lock: Lock },
    /// The lock was confirmed earlier. `booking` is `None` only if storage lost it.
    AlreadyConfirmed { booking: Option<Booking>, lock: Lock },
    Expired(Lock),
    NotActive(Lock),
    NotOwner(Lock),
    /// A live booking already holds the slot. `None` when the storage constraint caught it.
    Conflict(Option<Conflict>),
    Missing,
}

/// Persistent store for holds and bookings.
///
/// Every method is a single atomic storage operation. Slot exclusivity for active
/// locks and for pending/confirmed bookings is enforced here, not by callers.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn slot_occupants(
        &self,
        restaurant_id: &str,
        table_id: &str,
        date: NaiveDate,
    ) -> StoreResult<SlotOccupants>;

    /// Fails with `StoreError::UniqueViolation` if another active lock holds the exact slot.
    async fn insert_lock(&self, lock: &Lock) -> StoreResult<()>;

    async fn get_lock(&self, lock_id: &LockId) -> StoreResult<Option<Lock>>;

    /// Conditional update: applies only while the lock is still in `from`.
    async fn transition_lock(
        &self,
        lock_id: &LockId,
        from: LockStatus,
        to: LockStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Lock>>;

    /// Applies only while the lock is active and unexpired at `now`.
    async fn extend_lock(
        &self,
        lock_id: &LockId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Lock>>;

    /// Runs the whole lock-to-booking conversion as one transaction.
    async fn confirm_hold(&self, plan: &ConfirmationPlan) -> StoreResult<ConfirmOutcome>;

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn booking_for_lock(&self, lock_id: &LockId) -> StoreResult<Option<Booking>>;

    /// Writes `updated` only if the stored version still equals `expected_version`.
    /// Returns `false` when the version moved on.
    async fn compare_and_swap_booking(&self, updated: &Booking, expected_version: i64) -> StoreResult<bool>;

    /// Deletes a cancelled or completed booking. Returns `false` if nothing matched.
    async fn delete_terminal_booking(&self, id: Uuid) -> StoreResult<bool>;

    async fn expire_locks(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn cancel_stale_pending(&self, created_before: DateTime<Utc>, entry: &HistoryEntry) -> StoreResult<u64>;

    async fn active_lock_owners(&self) -> StoreResult<Vec<String>>;

    async fn release_locks_for_users(&self, user_ids: &[String]) -> StoreResult<u64>;
}

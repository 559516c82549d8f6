use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tablehold_core::conflict::{self, ConflictQuery};
use tablehold_core::{
    Booking, BookingStatus, ConfirmOutcome, ConfirmationPlan, HistoryEntry, Lock, LockId,
    LockStatus, ReservationStore, Slot, SlotOccupants, StoreError, StoreResult,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    locks: HashMap<LockId, Lock>,
    bookings: HashMap<Uuid, Booking>,
}

impl Tables {
    fn same_slot(a: &Slot, b: &Slot) -> bool {
        a.shares_table_day(b) && a.start_time == b.start_time && a.end_time == b.end_time
    }

    /// Mirrors `reservation_locks_active_slot`.
    fn active_lock_on(&self, slot: &Slot) -> Option<&Lock> {
        self.locks
            .values()
            .find(|l| l.status == LockStatus::Active && Self::same_slot(&l.slot, slot))
    }

    /// Mirrors `bookings_live_slot`, ignoring `skip`.
    fn live_booking_on(&self, slot: &Slot, skip: Option<Uuid>) -> Option<&Booking> {
        self.bookings
            .values()
            .filter(|b| Some(b.id) != skip)
            .find(|b| b.status.is_live() && Self::same_slot(&b.slot, slot))
    }
}

/// Process-local store with the same atomicity and uniqueness guarantees as the
/// Postgres store. Every operation runs under one mutex.
#[derive(Default)]
pub struct InMemoryReservationStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }

    pub async fn lock_count(&self) -> usize {
        self.tables.lock().await.locks.len()
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn slot_occupants(
        &self,
        restaurant_id: &str,
        table_id: &str,
        date: NaiveDate,
    ) -> StoreResult<SlotOccupants> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let on_table_day = |slot: &Slot| {
            slot.restaurant_id == restaurant_id && slot.table_id == table_id && slot.date == date
        };
        Ok(SlotOccupants {
            bookings: tables
                .bookings
                .values()
                .filter(|b| b.status.is_live() && on_table_day(&b.slot))
                .cloned()
                .collect(),
            locks: tables
                .locks
                .values()
                .filter(|l| l.status == LockStatus::Active && on_table_day(&l.slot))
                .cloned()
                .collect(),
        })
    }

    async fn insert_lock(&self, lock: &Lock) -> StoreResult<()> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        // Past-TTL rows still marked active are retired before the uniqueness check.
        let now = lock.created_at;
        for existing in tables.locks.values_mut() {
            if existing.status == LockStatus::Active
                && existing.is_expired_at(now)
                && Tables::same_slot(&existing.slot, &lock.slot)
            {
                existing.status = LockStatus::Expired;
            }
        }

        if tables.locks.contains_key(&lock.id) {
            return Err(StoreError::UniqueViolation("reservation_locks_lock_id_key".to_string()));
        }
        if lock.status == LockStatus::Active && tables.active_lock_on(&lock.slot).is_some() {
            return Err(StoreError::UniqueViolation("reservation_locks_active_slot".to_string()));
        }
        tables.locks.insert(lock.id.clone(), lock.clone());
        Ok(())
    }

    async fn get_lock(&self, lock_id: &LockId) -> StoreResult<Option<Lock>> {
        self.check_available()?;
        Ok(self.tables.lock().await.locks.get(lock_id).cloned())
    }

    async fn transition_lock(
        &self,
        lock_id: &LockId,
        from: LockStatus,
        to: LockStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Lock>> {
        self.check_available()?;
        if !from.can_transition_to(to) {
            return Ok(None);
        }
        let mut tables = self.tables.lock().await;
        match tables.locks.get_mut(lock_id) {
            Some(lock) if lock.status == from => {
                lock.status = to;
                if to == LockStatus::Confirmed {
                    lock.confirmed_at = Some(at);
                }
                Ok(Some(lock.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn extend_lock(
        &self,
        lock_id: &LockId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Lock>> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        match tables.locks.get_mut(lock_id) {
            Some(lock) if lock.is_live_at(now) => {
                lock.expires_at = expires_at;
                Ok(Some(lock.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn confirm_hold(&self, plan: &ConfirmationPlan) -> StoreResult<ConfirmOutcome> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        let Some(lock) = tables.locks.get(&plan.lock_id).cloned() else {
            return Ok(ConfirmOutcome::Missing);
        };
        if !lock.is_owned_by(&plan.user_id) {
            return Ok(ConfirmOutcome::NotOwner(lock));
        }
        match lock.status {
            LockStatus::Active => {}
            LockStatus::Confirmed => {
                let booking = tables
                    .bookings
                    .values()
                    .find(|b| b.lock_id.as_ref() == Some(&lock.id))
                    .cloned();
                return Ok(ConfirmOutcome::AlreadyConfirmed { booking, lock });
            }
            LockStatus::Expired | LockStatus::Released => return Ok(ConfirmOutcome::NotActive(lock)),
        }

        if lock.is_expired_at(plan.now) {
            let mut expired = lock;
            expired.status = LockStatus::Expired;
            tables.locks.insert(expired.id.clone(), expired.clone());
            return Ok(ConfirmOutcome::Expired(expired));
        }

        let occupants = SlotOccupants {
            bookings: tables
                .bookings
                .values()
                .filter(|b| b.slot.shares_table_day(&lock.slot))
                .cloned()
                .collect(),
            locks: Vec::new(),
        };
        let report = conflict::detect(
            &occupants,
            &ConflictQuery {
                date: lock.slot.date,
                window: lock.slot.window(),
                exclude_lock: Some(&lock.id),
                exclude_booking: None,
                include_locks: false,
            },
            plan.now,
        );
        if let Some(hit) = report.first_exact() {
            return Ok(ConfirmOutcome::Conflict(Some(hit.clone())));
        }

        let booking = Booking::from_confirmed_lock(&lock, &plan.overrides, plan.booking_id, plan.now);
        if tables.bookings.contains_key(&booking.id) {
            return Err(StoreError::UniqueViolation("bookings_pkey".to_string()));
        }

        let mut confirmed = lock;
        confirmed.status = LockStatus::Confirmed;
        confirmed.confirmed_at = Some(plan.now);
        tables.locks.insert(confirmed.id.clone(), confirmed.clone());
        tables.bookings.insert(booking.id, booking.clone());

        Ok(ConfirmOutcome::Confirmed { booking, lock: confirmed })
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables.bookings.contains_key(&booking.id) {
            return Err(StoreError::UniqueViolation("bookings_pkey".to_string()));
        }
        if booking.status.is_live() && tables.live_booking_on(&booking.slot, None).is_some() {
            return Err(StoreError::UniqueViolation("bookings_live_slot".to_string()));
        }
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.check_available()?;
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn booking_for_lock(&self, lock_id: &LockId) -> StoreResult<Option<Booking>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .find(|b| b.lock_id.as_ref() == Some(lock_id))
            .cloned())
    }

    async fn compare_and_swap_booking(&self, updated: &Booking, expected_version: i64) -> StoreResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        match tables.bookings.get(&updated.id) {
            Some(current) if current.version == expected_version => {}
            _ => return Ok(false),
        }
        if updated.status.is_live() && tables.live_booking_on(&updated.slot, Some(updated.id)).is_some() {
            return Err(StoreError::UniqueViolation("bookings_live_slot".to_string()));
        }
        tables.bookings.insert(updated.id, updated.clone());
        Ok(true)
    }

    async fn delete_terminal_booking(&self, id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        match tables.bookings.get(&id) {
            Some(b) if b.status.is_terminal() => {
                tables.bookings.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_locks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let mut expired = 0;
        for lock in tables.locks.values_mut() {
            if lock.status == LockStatus::Active && lock.is_expired_at(now) {
                lock.status = LockStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn cancel_stale_pending(&self, created_before: DateTime<Utc>, entry: &HistoryEntry) -> StoreResult<u64> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let mut cancelled = 0;
        for booking in tables.bookings.values_mut() {
            if booking.status == BookingStatus::Pending && booking.created_at < created_before {
                booking.status = BookingStatus::Cancelled;
                booking.version += 1;
                booking.updated_at = entry.at;
                booking.history.push(entry.clone());
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn active_lock_owners(&self) -> StoreResult<Vec<String>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut owners: Vec<String> = tables
            .locks
            .values()
            .filter(|l| l.status == LockStatus::Active)
            .map(|l| l.user_id.clone())
            .collect();
        owners.sort();
        owners.dedup();
        Ok(owners)
    }

    async fn release_locks_for_users(&self, user_ids: &[String]) -> StoreResult<u64> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let mut released = 0;
        for lock in tables.locks.values_mut() {
            if lock.status == LockStatus::Active && user_ids.contains(&lock.user_id) {
                lock.status = LockStatus::Released;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tablehold_core::{BookingOverrides, ContactDetails, HoldMetadata};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap()
    }

    fn slot(start: &str, end: &str) -> Slot {
        Slot::new(
            "r1",
            "t4",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            start.parse().unwrap(),
            end.parse().unwrap(),
        )
        .unwrap()
    }

    fn hold(user: &str, at: DateTime<Utc>) -> Lock {
        Lock::new(
            slot("19:00", "20:30"),
            user.to_string(),
            2,
            Duration::minutes(5),
            HoldMetadata::default(),
            at,
        )
    }

    fn plan(lock: &Lock, at: DateTime<Utc>) -> ConfirmationPlan {
        ConfirmationPlan {
            lock_id: lock.id.clone(),
            user_id: lock.user_id.clone(),
            booking_id: Uuid::new_v4(),
            overrides: BookingOverrides::default(),
            now: at,
        }
    }

    #[tokio::test]
    async fn test_second_active_lock_on_same_slot_is_rejected() {
        let store = InMemoryReservationStore::new();
        store.insert_lock(&hold("a", now())).await.unwrap();

        let err = store.insert_lock(&hold("b", now())).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_expired_lock_does_not_block_new_hold() {
        let store = InMemoryReservationStore::new();
        let stale = hold("a", now());
        store.insert_lock(&stale).await.unwrap();

        let later = now() + Duration::minutes(5);
        store.insert_lock(&hold("b", later)).await.unwrap();

        let old = store.get_lock(&stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, LockStatus::Expired);
    }

    #[tokio::test]
    async fn test_confirm_writes_booking_and_flips_lock() {
        let store = InMemoryReservationStore::new();
        let lock = hold("a", now());
        store.insert_lock(&lock).await.unwrap();

        let outcome = store.confirm_hold(&plan(&lock, now() + Duration::minutes(1))).await.unwrap();
        let ConfirmOutcome::Confirmed { booking, lock: confirmed } = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(confirmed.status, LockStatus::Confirmed);
        assert_eq!(booking.lock_id, Some(lock.id.clone()));
        assert_eq!(store.booking_for_lock(&lock.id).await.unwrap(), Some(booking));
    }

    #[tokio::test]
    async fn test_confirm_past_ttl_only_expires_lock() {
        let store = InMemoryReservationStore::new();
        let lock = hold("a", now());
        store.insert_lock(&lock).await.unwrap();

        let outcome = store.confirm_hold(&plan(&lock, now() + Duration::minutes(5))).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Expired(_)));
        assert_eq!(store.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_confirm_blocked_by_existing_booking() {
        let store = InMemoryReservationStore::new();
        let direct = Booking::new_pending(slot("19:00", "20:30"), "c".into(), 2, ContactDetails::default(), None, now());
        store.insert_booking(&direct).await.unwrap();
        let lock = hold("a", now());
        store.insert_lock(&lock).await.unwrap();

        let outcome = store.confirm_hold(&plan(&lock, now())).await.unwrap();
        match outcome {
            ConfirmOutcome::Conflict(Some(c)) => assert_eq!(c.booking_id(), Some(direct.id)),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let still = store.get_lock(&lock.id).await.unwrap().unwrap();
        assert_eq!(still.status, LockStatus::Active);
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_version() {
        let store = InMemoryReservationStore::new();
        let booking = Booking::new_pending(slot("18:00", "20:00"), "c".into(), 2, ContactDetails::default(), None, now());
        store.insert_booking(&booking).await.unwrap();

        let mut next = booking.clone();
        next.version = 2;
        assert!(store.compare_and_swap_booking(&next, 1).await.unwrap());
        assert!(!store.compare_and_swap_booking(&next, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryReservationStore::new();
        store.set_unavailable(true);
        let err = store.get_booking(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}

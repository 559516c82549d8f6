use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tablehold_core::{
    Clock, HoldMetadata, Lock, LockId, LockStatus, ReservationError, ReservationResult,
    ReservationStore, Slot, StoreError,
};
use tracing::{debug, info, warn};

use crate::detector::{ConflictCheck, ConflictDetector};

pub const MAX_GUESTS: u16 = 100;

/// TTL bounds for holds, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    pub default_hold_minutes: i64,
    pub max_hold_minutes: i64,
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            default_hold_minutes: 5,
            max_hold_minutes: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub slot: Slot,
    pub guest_count: u16,
    pub user_id: String,
    /// Falls back to the policy default.
    pub hold_minutes: Option<i64>,
    pub metadata: HoldMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldStatus {
    pub lock: Lock,
    pub is_expired: bool,
    pub remaining_seconds: i64,
}

/// Creates, reads, extends and releases soft holds.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    detector: ConflictDetector,
    policy: HoldPolicy,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        detector: ConflictDetector,
        policy: HoldPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            detector,
            policy,
        }
    }

    pub fn policy(&self) -> HoldPolicy {
        self.policy
    }

    pub async fn create_hold(&self, request: HoldRequest) -> ReservationResult<Lock> {
        // 1. Validate input
        let minutes = request.hold_minutes.unwrap_or(self.policy.default_hold_minutes);
        self.validate_minutes(minutes)?;
        validate_guests(request.guest_count)?;
        if request.user_id.trim().is_empty() {
            return Err(ReservationError::Validation("user_id is required".to_string()));
        }

        // 2. Exact-match check against bookings and live holds
        let check = ConflictCheck::slot(request.slot.clone());
        if let Err(e) = self.detector.ensure_no_exact(&check).await {
            if let ReservationError::ExactConflict(hit) = &e {
                info!(
                    restaurant_id = %request.slot.restaurant_id,
                    table_id = %request.slot.table_id,
                    "Hold refused, {} {} holds {}",
                    hit.source,
                    hit.id,
                    request.slot
                );
            }
            return Err(e);
        }

        // 3. Insert; storage arbitrates the race
        let now = self.clock.now();
        let lock = Lock::new(
            request.slot,
            request.user_id,
            request.guest_count,
            Duration::minutes(minutes),
            request.metadata,
            now,
        );

        match self.store.insert_lock(&lock).await {
            Ok(()) => {
                info!(
                    lock_id = %lock.id,
                    restaurant_id = %lock.slot.restaurant_id,
                    table_id = %lock.slot.table_id,
                    "Hold created on {} until {}",
                    lock.slot,
                    lock.expires_at
                );
                Ok(lock)
            }
            Err(StoreError::UniqueViolation(constraint)) => {
                warn!(
                    restaurant_id = %lock.slot.restaurant_id,
                    table_id = %lock.slot.table_id,
                    %constraint,
                    "Hold lost insert race on {}",
                    lock.slot
                );
                Err(ReservationError::TransientStorageRace)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads a hold, recording its expiry if the TTL has passed but nothing swept it yet.
    pub async fn get_status(&self, lock_id: &LockId) -> ReservationResult<HoldStatus> {
        let mut lock = self.load(lock_id).await?;
        let now = self.clock.now();

        if lock.status == LockStatus::Active && lock.is_expired_at(now) {
            lock = match self
                .store
                .transition_lock(lock_id, LockStatus::Active, LockStatus::Expired, now)
                .await?
            {
                Some(expired) => {
                    debug!(lock_id = %lock_id, "Hold expired on read");
                    expired
                }
                // Someone else moved it first; report what they left.
                None => self.load(lock_id).await?,
            };
        }

        let is_expired = lock.status == LockStatus::Expired
            || (lock.status == LockStatus::Active && lock.is_expired_at(now));
        let remaining_seconds = lock.remaining_at(now).num_seconds();

        Ok(HoldStatus {
            lock,
            is_expired,
            remaining_seconds,
        })
    }

    /// Releasing twice, or releasing a hold that already lapsed, is a no-op.
    pub async fn release(&self, lock_id: &LockId, user_id: &str) -> ReservationResult<Lock> {
        let lock = self.load(lock_id).await?;
        if !lock.is_owned_by(user_id) {
            return Err(ReservationError::Forbidden(format!("hold {} belongs to another user", lock_id)));
        }
        if lock.status != LockStatus::Active {
            return settled_release(lock);
        }

        let now = self.clock.now();
        let target = if lock.is_expired_at(now) {
            LockStatus::Expired
        } else {
            LockStatus::Released
        };
        match self.store.transition_lock(lock_id, LockStatus::Active, target, now).await? {
            Some(updated) => {
                info!(lock_id = %lock_id, "Hold {}", updated.status);
                Ok(updated)
            }
            None => settled_release(self.load(lock_id).await?),
        }
    }

    /// Pushes `expires_at` out by `minutes`, capped at `max_hold_minutes` from now.
    pub async fn extend(&self, lock_id: &LockId, user_id: &str, minutes: i64) -> ReservationResult<Lock> {
        if minutes <= 0 {
            return Err(ReservationError::Validation("minutes must be positive".to_string()));
        }
        let lock = self.load(lock_id).await?;
        if !lock.is_owned_by(user_id) {
            return Err(ReservationError::Forbidden(format!("hold {} belongs to another user", lock_id)));
        }

        let now = self.clock.now();
        self.ensure_extendable(&lock, now).await?;

        // Anything past the cap lands on the cap; clamp before building the delta.
        let minutes = minutes.min(self.policy.max_hold_minutes);
        let cap = now + Duration::minutes(self.policy.max_hold_minutes);
        let expires_at = std::cmp::min(lock.expires_at + Duration::minutes(minutes), cap);

        match self.store.extend_lock(lock_id, expires_at, now).await? {
            Some(extended) => {
                info!(lock_id = %lock_id, "Hold extended until {}", extended.expires_at);
                Ok(extended)
            }
            None => {
                let current = self.load(lock_id).await?;
                self.ensure_extendable(&current, now).await?;
                Err(ReservationError::Integrity(format!(
                    "hold {} is active but could not be extended",
                    lock_id
                )))
            }
        }
    }

    async fn ensure_extendable(&self, lock: &Lock, now: chrono::DateTime<chrono::Utc>) -> ReservationResult<()> {
        match lock.status {
            LockStatus::Active if lock.is_expired_at(now) => {
                self.store
                    .transition_lock(&lock.id, LockStatus::Active, LockStatus::Expired, now)
                    .await?;
                Err(ReservationError::HoldExpired(lock.id.clone()))
            }
            LockStatus::Active => Ok(()),
            LockStatus::Expired => Err(ReservationError::HoldExpired(lock.id.clone())),
            other => Err(ReservationError::AlreadyTerminal {
                entity: format!("hold {}", lock.id),
                status: other.to_string(),
            }),
        }
    }

    /// Plain read with no lazy expiry; callers that must authorize before any write start here.
    pub async fn get_lock(&self, lock_id: &LockId) -> ReservationResult<Lock> {
        self.load(lock_id).await
    }

    async fn load(&self, lock_id: &LockId) -> ReservationResult<Lock> {
        self.store
            .get_lock(lock_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("hold {}", lock_id)))
    }

    fn validate_minutes(&self, minutes: i64) -> ReservationResult<()> {
        if minutes <= 0 {
            return Err(ReservationError::Validation("hold_minutes must be positive".to_string()));
        }
        if minutes > self.policy.max_hold_minutes {
            return Err(ReservationError::Validation(format!(
                "hold_minutes may not exceed {}",
                self.policy.max_hold_minutes
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_guests(guest_count: u16) -> ReservationResult<()> {
    if guest_count == 0 || guest_count > MAX_GUESTS {
        return Err(ReservationError::Validation(format!(
            "guest_count must be between 1 and {}",
            MAX_GUESTS
        )));
    }
    Ok(())
}

fn settled_release(lock: Lock) -> ReservationResult<Lock> {
    match lock.status {
        LockStatus::Released | LockStatus::Expired => Ok(lock),
        LockStatus::Confirmed => Err(ReservationError::AlreadyTerminal {
            entity: format!("hold {}", lock.id),
            status: lock.status.to_string(),
        }),
        LockStatus::Active => Err(ReservationError::Integrity(format!(
            "hold {} is still active after a failed release",
            lock.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tablehold_core::{ConflictSource, ManualClock};
    use tablehold_store::InMemoryReservationStore;

    struct Fixture {
        clock: Arc<ManualClock>,
        manager: LockManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap()));
        let store: Arc<dyn ReservationStore> = Arc::new(InMemoryReservationStore::new());
        let detector = ConflictDetector::new(store.clone(), clock.clone());
        let manager = LockManager::new(store, clock.clone(), detector, HoldPolicy::default());
        Fixture { clock, manager }
    }

    fn request(user: &str) -> HoldRequest {
        HoldRequest {
            slot: Slot::new(
                "r1",
                "t4",
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                "19:00".parse().unwrap(),
                "20:30".parse().unwrap(),
            )
            .unwrap(),
            guest_count: 2,
            user_id: user.to_string(),
            hold_minutes: None,
            metadata: HoldMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_create_hold_uses_default_ttl() {
        let f = fixture();
        let lock = f.manager.create_hold(request("u1")).await.unwrap();
        assert_eq!(lock.status, LockStatus::Active);
        assert_eq!(lock.expires_at - lock.created_at, Duration::minutes(5));
        assert!(lock.id.as_str().starts_with("hold_"));
    }

    #[tokio::test]
    async fn test_hold_minutes_must_be_positive_and_bounded() {
        let f = fixture();
        for minutes in [0, -3, 31] {
            let mut req = request("u1");
            req.hold_minutes = Some(minutes);
            let err = f.manager.create_hold(req).await.unwrap_err();
            assert!(matches!(err, ReservationError::Validation(_)), "minutes = {}", minutes);
        }
    }

    #[tokio::test]
    async fn test_second_hold_reports_lock_conflict() {
        let f = fixture();
        let first = f.manager.create_hold(request("u1")).await.unwrap();
        let err = f.manager.create_hold(request("u2")).await.unwrap_err();
        match err {
            ReservationError::ExactConflict(hit) => {
                assert_eq!(hit.source, ConflictSource::Lock);
                assert_eq!(hit.id, first.id.to_string());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_status_expires_lazily() {
        let f = fixture();
        let lock = f.manager.create_hold(request("u1")).await.unwrap();

        let fresh = f.manager.get_status(&lock.id).await.unwrap();
        assert!(!fresh.is_expired);
        assert_eq!(fresh.remaining_seconds, 300);

        f.clock.advance(Duration::minutes(6));
        let stale = f.manager.get_status(&lock.id).await.unwrap();
        assert!(stale.is_expired);
        assert_eq!(stale.lock.status, LockStatus::Expired);
        assert_eq!(stale.remaining_seconds, 0);
    }

    #[tokio::test]
    async fn test_release_checks_owner_and_is_idempotent() {
        let f = fixture();
        let lock = f.manager.create_hold(request("u1")).await.unwrap();

        let err = f.manager.release(&lock.id, "u2").await.unwrap_err();
        assert!(matches!(err, ReservationError::Forbidden(_)));

        let released = f.manager.release(&lock.id, "u1").await.unwrap();
        assert_eq!(released.status, LockStatus::Released);
        let again = f.manager.release(&lock.id, "u1").await.unwrap();
        assert_eq!(again.status, LockStatus::Released);

        // The slot is free again
        f.manager.create_hold(request("u2")).await.unwrap();
    }

    #[tokio::test]
    async fn test_extend_is_capped_and_refuses_expired_holds() {
        let f = fixture();
        let lock = f.manager.create_hold(request("u1")).await.unwrap();

        let extended = f.manager.extend(&lock.id, "u1", 10).await.unwrap();
        assert_eq!(extended.expires_at - lock.created_at, Duration::minutes(15));

        let capped = f.manager.extend(&lock.id, "u1", 60).await.unwrap();
        assert_eq!(capped.expires_at - f.clock.now(), Duration::minutes(30));

        f.clock.advance(Duration::minutes(31));
        let err = f.manager.extend(&lock.id, "u1", 5).await.unwrap_err();
        assert!(matches!(err, ReservationError::HoldExpired(_)));
    }

    #[tokio::test]
    async fn test_extend_with_huge_minutes_is_capped() {
        let f = fixture();
        let lock = f.manager.create_hold(request("u1")).await.unwrap();

        let capped = f.manager.extend(&lock.id, "u1", i64::MAX).await.unwrap();
        assert_eq!(capped.expires_at - f.clock.now(), Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_extend_refuses_released_hold() {
        let f = fixture();
        let lock = f.manager.create_hold(request("u1")).await.unwrap();
        f.manager.release(&lock.id, "u1").await.unwrap();

        let err = f.manager.extend(&lock.id, "u1", 5).await.unwrap_err();
        match err {
            ReservationError::AlreadyTerminal { status, .. } => assert_eq!(status, LockStatus::Released.to_string()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_lock_does_not_expire_on_read() {
        let f = fixture();
        let lock = f.manager.create_hold(request("u1")).await.unwrap();
        f.clock.advance(Duration::minutes(6));

        let raw = f.manager.get_lock(&lock.id).await.unwrap();
        assert_eq!(raw.status, LockStatus::Active);
        assert!(raw.is_expired_at(f.clock.now()));
    }

    #[tokio::test]
    async fn test_unknown_hold_is_not_found() {
        let f = fixture();
        let err = f.manager.get_status(&LockId::generate()).await.unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));
    }
}

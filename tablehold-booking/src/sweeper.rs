use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tablehold_core::identity::UserDirectory;
use tablehold_core::{Clock, HistoryEntry, ReservationResult, ReservationStore};
use tracing::{info, warn};

pub const SWEEPER_ACTOR: &str = "system:sweeper";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_locks: u64,
    pub cancelled_bookings: u64,
    pub released_orphans: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.expired_locks + self.cancelled_bookings + self.released_orphans
    }
}

/// Out-of-band reconciliation of time-based state. Every step is a conditional bulk
/// update, so overlapping runs converge on the same result.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    users: Arc<dyn UserDirectory>,
    stale_after: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        users: Arc<dyn UserDirectory>,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            users,
            stale_after,
        }
    }

    pub async fn run(&self) -> ReservationResult<SweepReport> {
        let now = self.clock.now();

        // 1. Holds past their TTL
        let expired_locks = self.store.expire_locks(now).await?;

        // 2. Pending bookings nobody acted on
        let entry = HistoryEntry::new(
            "auto_cancelled",
            SWEEPER_ACTOR,
            now,
            json!({
                "reason": "pending booking was never confirmed",
                "stale_after_hours": self.stale_after.num_hours(),
            }),
        );
        let cancelled_bookings = self
            .store
            .cancel_stale_pending(now - self.stale_after, &entry)
            .await?;

        // 3. Active holds whose owner no longer resolves
        let released_orphans = self.release_orphans().await?;

        let report = SweepReport {
            expired_locks,
            cancelled_bookings,
            released_orphans,
        };
        info!(expired_locks, cancelled_bookings, released_orphans, "Sweep finished");
        Ok(report)
    }

    async fn release_orphans(&self) -> ReservationResult<u64> {
        let owners = self.store.active_lock_owners().await?;
        let mut orphans = Vec::new();
        for owner in owners {
            match self.users.user_exists(&owner).await {
                Ok(true) => {}
                Ok(false) => orphans.push(owner),
                // An unreachable directory is not evidence the user is gone.
                Err(e) => warn!(user_id = %owner, "User lookup failed, keeping holds: {}", e),
            }
        }
        if orphans.is_empty() {
            return Ok(0);
        }
        let released = self.store.release_locks_for_users(&orphans).await?;
        if released > 0 {
            warn!(users = orphans.len(), released, "Released holds of users that no longer exist");
        }
        Ok(released)
    }
}

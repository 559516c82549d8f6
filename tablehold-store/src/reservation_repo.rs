use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tablehold_core::conflict::{self, ConflictQuery};
use tablehold_core::{
    Booking, ConfirmOutcome, ConfirmationPlan, ContactDetails, HistoryEntry,
    HoldMetadata, Lock, LockId, LockStatus, PricingSnapshot, ReservationStore, Slot,
    SlotOccupants, StoreError, StoreResult, TimeOfDay,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::map_sqlx;

macro_rules! lock_columns {
    () => {
        "lock_id, restaurant_id, table_id, slot_date, start_minute, end_minute, user_id, \
         guest_count, status, created_at, expires_at, confirmed_at, metadata"
    };
}

macro_rules! booking_columns {
    () => {
        "id, restaurant_id, table_id, slot_date, start_minute, end_minute, user_id, guest_count, \
         status, version, history, lock_id, contact, pricing, created_at, updated_at"
    };
}

const SELECT_LOCK: &str = concat!("SELECT ", lock_columns!(), " FROM reservation_locks WHERE lock_id = $1");

const SELECT_LOCK_FOR_UPDATE: &str = concat!(
    "SELECT ", lock_columns!(), " FROM reservation_locks WHERE lock_id = $1 FOR UPDATE"
);

const SELECT_ACTIVE_LOCKS_FOR_TABLE_DAY: &str = concat!(
    "SELECT ", lock_columns!(), " FROM reservation_locks \
     WHERE restaurant_id = $1 AND table_id = $2 AND slot_date = $3 AND status = 'active'"
);

const SELECT_LIVE_BOOKINGS_FOR_TABLE_DAY: &str = concat!(
    "SELECT ", booking_columns!(), " FROM bookings \
     WHERE restaurant_id = $1 AND table_id = $2 AND slot_date = $3 \
     AND status IN ('pending', 'confirmed')"
);

const SELECT_BOOKING: &str = concat!("SELECT ", booking_columns!(), " FROM bookings WHERE id = $1");

const SELECT_BOOKING_BY_LOCK: &str = concat!("SELECT ", booking_columns!(), " FROM bookings WHERE lock_id = $1");

const INSERT_LOCK: &str = concat!(
    "INSERT INTO reservation_locks (", lock_columns!(), ") \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
);

const INSERT_BOOKING: &str = concat!(
    "INSERT INTO bookings (", booking_columns!(), ") \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
);

const EXPIRE_STALE_FOR_SLOT: &str = "UPDATE reservation_locks SET status = 'expired' \
     WHERE restaurant_id = $1 AND table_id = $2 AND slot_date = $3 \
     AND start_minute = $4 AND end_minute = $5 \
     AND status = 'active' AND expires_at <= $6";

const TRANSITION_LOCK: &str = concat!(
    "UPDATE reservation_locks SET status = $3::text, \
     confirmed_at = CASE WHEN $3::text = 'confirmed' THEN $4::timestamptz ELSE confirmed_at END \
     WHERE lock_id = $1 AND status = $2 RETURNING ",
    lock_columns!()
);

const EXTEND_LOCK: &str = concat!(
    "UPDATE reservation_locks SET expires_at = $2 \
     WHERE lock_id = $1 AND status = 'active' AND expires_at > $3 RETURNING ",
    lock_columns!()
);

const CONFIRM_LOCK: &str = "UPDATE reservation_locks SET status = 'confirmed', confirmed_at = $2 \
     WHERE lock_id = $1 AND status = 'active'";

const EXPIRE_LOCK: &str = "UPDATE reservation_locks SET status = 'expired' \
     WHERE lock_id = $1 AND status = 'active'";

const CAS_BOOKING: &str = "UPDATE bookings SET slot_date = $3, start_minute = $4, end_minute = $5, \
     guest_count = $6, status = $7, version = $8, history = $9, contact = $10, pricing = $11, updated_at = $12 \
     WHERE id = $1 AND version = $2";

#[derive(sqlx::FromRow)]
struct LockRow {
    lock_id: String,
    restaurant_id: String,
    table_id: String,
    slot_date: NaiveDate,
    start_minute: i16,
    end_minute: i16,
    user_id: String,
    guest_count: i16,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    metadata: Json<HoldMetadata>,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    restaurant_id: String,
    table_id: String,
    slot_date: NaiveDate,
    start_minute: i16,
    end_minute: i16,
    user_id: String,
    guest_count: i16,
    status: String,
    version: i64,
    history: Json<Vec<HistoryEntry>>,
    lock_id: Option<String>,
    contact: Json<ContactDetails>,
    pricing: Option<Json<PricingSnapshot>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn minute_of_day(raw: i16) -> StoreResult<TimeOfDay> {
    u16::try_from(raw)
        .ok()
        .and_then(|m| TimeOfDay::from_minutes(m).ok())
        .ok_or_else(|| StoreError::Corrupt(format!("minute of day out of range: {}", raw)))
}

fn guests(raw: i16) -> StoreResult<u16> {
    u16::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative guest count: {}", raw)))
}

fn guests_column(count: u16) -> StoreResult<i16> {
    i16::try_from(count).map_err(|_| StoreError::Backend(format!("guest count too large: {}", count)))
}

fn slot_from_columns(
    restaurant_id: String,
    table_id: String,
    date: NaiveDate,
    start: i16,
    end: i16,
) -> StoreResult<Slot> {
    Slot::new(restaurant_id, table_id, date, minute_of_day(start)?, minute_of_day(end)?)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

impl TryFrom<LockRow> for Lock {
    type Error = StoreError;

    fn try_from(row: LockRow) -> Result<Self, Self::Error> {
        Ok(Lock {
            id: LockId::parse(&row.lock_id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            slot: slot_from_columns(row.restaurant_id, row.table_id, row.slot_date, row.start_minute, row.end_minute)?,
            user_id: row.user_id,
            guest_count: guests(row.guest_count)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            confirmed_at: row.confirmed_at,
            metadata: row.metadata.0,
        })
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let lock_id = row
            .lock_id
            .as_deref()
            .map(LockId::parse)
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Booking {
            id: row.id,
            slot: slot_from_columns(row.restaurant_id, row.table_id, row.slot_date, row.start_minute, row.end_minute)?,
            user_id: row.user_id,
            guest_count: guests(row.guest_count)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            version: row.version,
            history: row.history.0,
            lock_id,
            contact: row.contact.0,
            pricing: row.pricing.map(|p| p.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed store. Slot exclusivity lives in the partial unique indexes
/// `reservation_locks_active_slot` and `bookings_live_slot`.
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn live_bookings(
        conn: &mut PgConnection,
        restaurant_id: &str,
        table_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(SELECT_LIVE_BOOKINGS_FOR_TABLE_DAY)
            .bind(restaurant_id)
            .bind(table_id)
            .bind(date)
            .fetch_all(conn)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn active_locks(
        conn: &mut PgConnection,
        restaurant_id: &str,
        table_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<Lock>> {
        let rows: Vec<LockRow> = sqlx::query_as(SELECT_ACTIVE_LOCKS_FOR_TABLE_DAY)
            .bind(restaurant_id)
            .bind(table_id)
            .bind(date)
            .fetch_all(conn)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter().map(Lock::try_from).collect()
    }

    async fn booking_by_lock(conn: &mut PgConnection, lock_id: &LockId) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(SELECT_BOOKING_BY_LOCK)
            .bind(lock_id.as_str())
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx)?;
        row.map(Booking::try_from).transpose()
    }

    async fn write_booking(conn: &mut PgConnection, booking: &Booking) -> StoreResult<()> {
        sqlx::query(INSERT_BOOKING)
            .bind(booking.id)
            .bind(&booking.slot.restaurant_id)
            .bind(&booking.slot.table_id)
            .bind(booking.slot.date)
            .bind(booking.slot.start_time.minutes() as i16)
            .bind(booking.slot.end_time.minutes() as i16)
            .bind(&booking.user_id)
            .bind(guests_column(booking.guest_count)?)
            .bind(booking.status.as_str())
            .bind(booking.version)
            .bind(Json(&booking.history))
            .bind(booking.lock_id.as_ref().map(|id| id.as_str()))
            .bind(Json(&booking.contact))
            .bind(booking.pricing.as_ref().map(Json))
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(conn)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn slot_occupants(
        &self,
        restaurant_id: &str,
        table_id: &str,
        date: NaiveDate,
    ) -> StoreResult<SlotOccupants> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        let bookings = Self::live_bookings(&mut conn, restaurant_id, table_id, date).await?;
        let locks = Self::active_locks(&mut conn, restaurant_id, table_id, date).await?;
        Ok(SlotOccupants { bookings, locks })
    }

    async fn insert_lock(&self, lock: &Lock) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Rows past their TTL still carry status 'active' until swept; retire them
        // so the partial index only guards live holds.
        let retired = sqlx::query(EXPIRE_STALE_FOR_SLOT)
            .bind(&lock.slot.restaurant_id)
            .bind(&lock.slot.table_id)
            .bind(lock.slot.date)
            .bind(lock.slot.start_time.minutes() as i16)
            .bind(lock.slot.end_time.minutes() as i16)
            .bind(lock.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .rows_affected();
        if retired > 0 {
            debug!(slot = %lock.slot, retired, "Expired stale holds before insert");
        }

        sqlx::query(INSERT_LOCK)
            .bind(lock.id.as_str())
            .bind(&lock.slot.restaurant_id)
            .bind(&lock.slot.table_id)
            .bind(lock.slot.date)
            .bind(lock.slot.start_time.minutes() as i16)
            .bind(lock.slot.end_time.minutes() as i16)
            .bind(&lock.user_id)
            .bind(guests_column(lock.guest_count)?)
            .bind(lock.status.as_str())
            .bind(lock.created_at)
            .bind(lock.expires_at)
            .bind(lock.confirmed_at)
            .bind(Json(&lock.metadata))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_lock(&self, lock_id: &LockId) -> StoreResult<Option<Lock>> {
        let row: Option<LockRow> = sqlx::query_as(SELECT_LOCK)
            .bind(lock_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(Lock::try_from).transpose()
    }

    async fn transition_lock(
        &self,
        lock_id: &LockId,
        from: LockStatus,
        to: LockStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Lock>> {
        if !from.can_transition_to(to) {
            return Ok(None);
        }
        let row: Option<LockRow> = sqlx::query_as(TRANSITION_LOCK)
            .bind(lock_id.as_str())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(Lock::try_from).transpose()
    }

    async fn extend_lock(
        &self,
        lock_id: &LockId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Lock>> {
        let row: Option<LockRow> = sqlx::query_as(EXTEND_LOCK)
            .bind(lock_id.as_str())
            .bind(expires_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(Lock::try_from).transpose()
    }

    async fn confirm_hold(&self, plan: &ConfirmationPlan) -> StoreResult<ConfirmOutcome> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // 1. Pin the lock row for the rest of the transaction
        let row: Option<LockRow> = sqlx::query_as(SELECT_LOCK_FOR_UPDATE)
            .bind(plan.lock_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let Some(row) = row else {
            return Ok(ConfirmOutcome::Missing);
        };
        let mut lock = Lock::try_from(row)?;

        if !lock.is_owned_by(&plan.user_id) {
            return Ok(ConfirmOutcome::NotOwner(lock));
        }

        match lock.status {
            LockStatus::Active => {}
            LockStatus::Confirmed => {
                let booking = Self::booking_by_lock(&mut tx, &lock.id).await?;
                return Ok(ConfirmOutcome::AlreadyConfirmed { booking, lock });
            }
            LockStatus::Expired | LockStatus::Released => return Ok(ConfirmOutcome::NotActive(lock)),
        }

        // 2. Past TTL: record the expiry and stop. Nothing else is written.
        if lock.is_expired_at(plan.now) {
            sqlx::query(EXPIRE_LOCK)
                .bind(lock.id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            tx.commit().await.map_err(map_sqlx)?;
            lock.status = LockStatus::Expired;
            return Ok(ConfirmOutcome::Expired(lock));
        }

        // 3. The hold alone does not prove exclusivity; check bookings directly
        let bookings = Self::live_bookings(&mut tx, &lock.slot.restaurant_id, &lock.slot.table_id, lock.slot.date).await?;
        let occupants = SlotOccupants { bookings, locks: Vec::new() };
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
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(ConfirmOutcome::Conflict(Some(hit.clone())));
        }

        // 4. Booking plus its first history entry
        let booking = Booking::from_confirmed_lock(&lock, &plan.overrides, plan.booking_id, plan.now);
        match Self::write_booking(&mut tx, &booking).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(constraint)) => {
                warn!(lock_id = %lock.id, %constraint, "Booking insert lost the race at the storage constraint");
                tx.rollback().await.map_err(map_sqlx)?;
                return Ok(ConfirmOutcome::Conflict(None));
            }
            Err(e) => return Err(e),
        }

        // 5. Flip the lock. The row is locked, so anything but one row means corruption.
        let flipped = sqlx::query(CONFIRM_LOCK)
            .bind(lock.id.as_str())
            .bind(plan.now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .rows_affected();
        if flipped != 1 {
            tx.rollback().await.map_err(map_sqlx)?;
            return Err(StoreError::Backend(format!(
                "lock {} changed while pinned for confirmation",
                lock.id
            )));
        }

        tx.commit().await.map_err(map_sqlx)?;

        lock.status = LockStatus::Confirmed;
        lock.confirmed_at = Some(plan.now);
        Ok(ConfirmOutcome::Confirmed { booking, lock })
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        Self::write_booking(&mut conn, booking).await
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(SELECT_BOOKING)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(Booking::try_from).transpose()
    }

    async fn booking_for_lock(&self, lock_id: &LockId) -> StoreResult<Option<Booking>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        Self::booking_by_lock(&mut conn, lock_id).await
    }

    async fn compare_and_swap_booking(&self, updated: &Booking, expected_version: i64) -> StoreResult<bool> {
        let result = sqlx::query(CAS_BOOKING)
            .bind(updated.id)
            .bind(expected_version)
            .bind(updated.slot.date)
            .bind(updated.slot.start_time.minutes() as i16)
            .bind(updated.slot.end_time.minutes() as i16)
            .bind(guests_column(updated.guest_count)?)
            .bind(updated.status.as_str())
            .bind(updated.version)
            .bind(Json(&updated.history))
            .bind(Json(&updated.contact))
            .bind(updated.pricing.as_ref().map(Json))
            .bind(updated.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_terminal_booking(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1 AND status IN ('cancelled', 'completed')")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_locks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE reservation_locks SET status = 'expired' WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn cancel_stale_pending(&self, created_before: DateTime<Utc>, entry: &HistoryEntry) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'cancelled', version = version + 1, updated_at = $2, \
             history = history || jsonb_build_array($3::jsonb) \
             WHERE status = 'pending' AND created_at < $1",
        )
        .bind(created_before)
        .bind(entry.at)
        .bind(Json(entry))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn active_lock_owners(&self) -> StoreResult<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT user_id FROM reservation_locks WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn release_locks_for_users(&self, user_ids: &[String]) -> StoreResult<u64> {
        if user_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE reservation_locks SET status = 'released' WHERE status = 'active' AND user_id = ANY($1)",
        )
        .bind(user_ids)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

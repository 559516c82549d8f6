use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tablehold_core::usage::{usage_period, UsageCounter};

/// Monthly booking counter per restaurant, one row per (restaurant, period).
pub struct PgUsageCounter {
    pool: PgPool,
}

impl PgUsageCounter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn bookings_in_period(&self, restaurant_id: &str, period: &str) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT bookings_count FROM usage_quotas WHERE restaurant_id = $1 AND period = $2",
        )
        .bind(restaurant_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0))
    }
}

#[async_trait]
impl UsageCounter for PgUsageCounter {
    async fn record_booking(
        &self,
        restaurant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO usage_quotas (restaurant_id, period, bookings_count, updated_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (restaurant_id, period)
            DO UPDATE SET bookings_count = usage_quotas.bookings_count + 1, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(restaurant_id)
        .bind(usage_period(at))
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

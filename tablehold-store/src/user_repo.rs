use async_trait::async_trait;
use sqlx::PgPool;
use tablehold_core::identity::UserDirectory;

/// Reads the local `users` projection. A soft-deleted user no longer exists.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn user_exists(&self, user_id: &str) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

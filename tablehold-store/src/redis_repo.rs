use tracing::debug;

/// Thin Redis wrapper. Only the HTTP edge uses it; reservation state never lives here.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns `true` while the caller is within `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> redis::RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        if count > limit {
            debug!("Rate limit exceeded for {}: {} > {}", key, count, limit);
        }
        Ok(count <= limit)
    }
}

/// Redis key for one caller's request counter in the current window.
pub fn rate_limit_key(client: &str, window_start: i64) -> String {
    format!("ratelimit:{}:{}", client, window_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_is_scoped_per_window() {
        assert_eq!(rate_limit_key("10.0.0.1", 42), "ratelimit:10.0.0.1:42");
        assert_ne!(rate_limit_key("10.0.0.1", 42), rate_limit_key("10.0.0.1", 43));
    }
}

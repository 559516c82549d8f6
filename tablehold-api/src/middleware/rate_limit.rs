use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tablehold_store::redis_repo::rate_limit_key;

use crate::error::AppError;
use crate::state::AppState;

const WINDOW_SECONDS: i64 = 60;

/// Per-IP fixed window. Fails open when Redis is missing or unreachable.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(req).await);
    };

    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let window = chrono::Utc::now().timestamp() / WINDOW_SECONDS;
    let key = rate_limit_key(&client, window);

    match redis
        .check_rate_limit(&key, state.business_rules.rate_limit_per_minute, WINDOW_SECONDS)
        .await
    {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err(AppError::RateLimited),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            Ok(next.run(req).await)
        }
    }
}

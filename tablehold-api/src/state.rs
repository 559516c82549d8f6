use std::sync::Arc;
use tablehold_booking::ReservationServices;
use tablehold_store::app_config::BusinessRules;
use tablehold_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub services: ReservationServices,
    /// `None` disables rate limiting.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub sweep_secret: String,
    pub business_rules: BusinessRules,
}

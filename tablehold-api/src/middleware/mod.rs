pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, sweep_secret_middleware, Claims, Identity, Role};
pub use rate_limit::rate_limit_middleware;

pub mod app_config;
pub mod database;
pub mod events;
pub mod memory;
pub mod quota_repo;
pub mod redis_repo;
pub mod reservation_repo;
pub mod user_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use memory::InMemoryReservationStore;
pub use quota_repo::PgUsageCounter;
pub use redis_repo::RedisClient;
pub use reservation_repo::PgReservationStore;
pub use user_repo::PgUserDirectory;

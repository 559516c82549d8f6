use chrono::Duration;
use std::net::SocketAddr;
use std::sync::Arc;
use tablehold_api::{app, AppState, AuthConfig};
use tablehold_booking::{Collaborators, HoldPolicy, ReservationServices, ServiceSettings};
use tablehold_core::SystemClock;
use tablehold_store::app_config::Config;
use tablehold_store::{
    DbClient, EventProducer, PgReservationStore, PgUsageCounter, PgUserDirectory, RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tablehold_api=debug,tablehold_booking=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting tablehold API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;

    // Redis (rate limiting only)
    let redis = match RedisClient::new(&config.redis.url).await {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
            None
        }
    };

    // Kafka
    let kafka = Arc::new(EventProducer::new(&config.kafka.brokers)?);

    let services = ReservationServices::new(
        Collaborators {
            store: Arc::new(PgReservationStore::new(db.pool.clone())),
            clock: Arc::new(SystemClock),
            users: Arc::new(PgUserDirectory::new(db.pool.clone())),
            usage: Arc::new(PgUsageCounter::new(db.pool.clone())),
            notifier: kafka,
        },
        ServiceSettings {
            hold: HoldPolicy {
                default_hold_minutes: config.rules.default_hold_minutes,
                max_hold_minutes: config.rules.max_hold_minutes,
            },
            stale_pending_after: Duration::hours(config.rules.stale_pending_hours),
        },
    );

    let app_state = AppState {
        services,
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        sweep_secret: config.sweeper.shared_secret.clone(),
        business_rules: config.rules.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

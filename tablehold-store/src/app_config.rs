use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_hold_minutes")]
    pub default_hold_minutes: i64,
    #[serde(default = "default_max_hold_minutes")]
    pub max_hold_minutes: i64,
    #[serde(default = "default_stale_pending_hours")]
    pub stale_pending_hours: i64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            default_hold_minutes: default_hold_minutes(),
            max_hold_minutes: default_max_hold_minutes(),
            stale_pending_hours: default_stale_pending_hours(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

fn default_hold_minutes() -> i64 { 5 }
fn default_max_hold_minutes() -> i64 { 30 }
fn default_stale_pending_hours() -> i64 { 24 }
fn default_rate_limit() -> i64 { 120 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// The external scheduler authenticates with this secret instead of a user token.
#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    pub shared_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TABLEHOLD__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TABLEHOLD").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_default_when_section_missing() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080
                [database]
                url = "postgres://localhost/tablehold"
                [redis]
                url = "redis://localhost"
                [kafka]
                brokers = "localhost:9092"
                [auth]
                jwt_secret = "dev"
                [sweeper]
                shared_secret = "sweep"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: Config = s.try_deserialize().unwrap();

        assert_eq!(cfg.rules.default_hold_minutes, 5);
        assert_eq!(cfg.rules.stale_pending_hours, 24);
        assert_eq!(cfg.database.max_connections, 5);
    }
}

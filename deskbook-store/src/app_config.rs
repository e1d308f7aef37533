use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Rate limiting and cross-instance event relay are off without it.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
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
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Requests per client IP per minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusinessRules {
    /// Unconfirmed holds expire after this long; 0 keeps them forever.
    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_seconds: u64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: default_hold_ttl(),
            reaper_interval_seconds: default_reaper_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_min_push_interval")]
    pub min_push_interval_ms: u64,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_broadcast_interval(),
            query_timeout_ms: default_query_timeout(),
            min_push_interval_ms: default_min_push_interval(),
            max_consecutive_failures: default_max_failures(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_true() -> bool { true }
fn default_rate_limit() -> i64 { 300 }
fn default_hold_ttl() -> u64 { 180 }
fn default_reaper_interval() -> u64 { 30 }
fn default_broadcast_interval() -> u64 { 5 }
fn default_query_timeout() -> u64 { 3000 }
fn default_min_push_interval() -> u64 { 500 }
fn default_max_failures() -> u32 { 3 }
fn default_outbox_capacity() -> usize { 8 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, e.g. config/production.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `DESKBOOK__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("DESKBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

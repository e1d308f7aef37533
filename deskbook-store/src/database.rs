use deskbook_core::CoreError;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::app_config::{BusinessRules, DatabaseConfig};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rules stored in the `business_rules` table on top of the
    /// configured defaults. Values are stored as `{"value": <number>}`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<RuleRow> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .fold(defaults, |rules, row| apply_rule(rules, &row.rule_key, &row.rule_value)))
    }
}

fn apply_rule(mut rules: BusinessRules, key: &str, value: &Value) -> BusinessRules {
    let Some(v) = value.get("value").and_then(Value::as_u64) else {
        return rules;
    };
    match key {
        "hold_ttl_seconds" => rules.hold_ttl_seconds = v,
        "reaper_interval_seconds" => rules.reaper_interval_seconds = v,
        _ => {}
    }
    rules
}

/// Translate a driver error into the domain taxonomy. A unique violation
/// means another writer claimed the slot first.
pub(crate) fn map_db_error(e: sqlx::Error) -> CoreError {
    match e {
        sqlx::Error::Database(db) => map_sqlstate(db.code().as_deref(), &db.to_string()),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => {
            error!("Database unavailable: {}", e);
            CoreError::StoreUnavailable(e.to_string())
        }
        other => {
            error!("Database error: {}", other);
            CoreError::Internal(other.to_string())
        }
    }
}

fn map_sqlstate(code: Option<&str>, message: &str) -> CoreError {
    match code {
        Some("23505") => CoreError::Conflict("Desk is already booked or held for this slot".to_string()),
        // Serialization failures and deadlocks say nothing about the slot.
        Some("40001") | Some("40P01") => {
            warn!("Transaction aborted by the database: {}", message);
            CoreError::StoreUnavailable(message.to_string())
        }
        _ => {
            error!("Database error: {}", message);
            CoreError::Internal(message.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_overrides() {
        let rules = apply_rule(BusinessRules::default(), "hold_ttl_seconds", &json!({"value": 600}));
        assert_eq!(rules.hold_ttl_seconds, 600);

        let rules = apply_rule(rules, "reaper_interval_seconds", &json!({"value": "soon"}));
        assert_eq!(rules.reaper_interval_seconds, 30);

        let rules = apply_rule(rules, "tax_rate", &json!({"value": 5}));
        assert_eq!(rules, BusinessRules { hold_ttl_seconds: 600, reaper_interval_seconds: 30 });
    }

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(matches!(map_db_error(sqlx::Error::PoolTimedOut), CoreError::StoreUnavailable(_)));
        assert!(matches!(map_db_error(sqlx::Error::RowNotFound), CoreError::Internal(_)));
    }

    #[test]
    fn test_only_unique_violations_conflict() {
        assert!(matches!(map_sqlstate(Some("23505"), "duplicate key"), CoreError::Conflict(_)));
        assert!(matches!(
            map_sqlstate(Some("40001"), "could not serialize access"),
            CoreError::StoreUnavailable(_)
        ));
        assert!(matches!(map_sqlstate(Some("40P01"), "deadlock detected"), CoreError::StoreUnavailable(_)));
        assert!(matches!(map_sqlstate(None, "boom"), CoreError::Internal(_)));
    }
}

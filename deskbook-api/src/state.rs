use std::sync::Arc;
use std::time::Duration;

use deskbook_booking::{AvailabilityService, BroadcastCoordinator, BroadcastSettings, Metrics, ReservationService};
use deskbook_core::repository::{CatalogRepository, ReservationRepository};
use deskbook_core::HoldPolicy;
use deskbook_shared::ReservationEvent;
use deskbook_store::app_config::{BroadcastConfig, BusinessRules};
use deskbook_store::RedisClient;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct RateLimit {
    pub redis: Arc<RedisClient>,
    pub per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationService>,
    pub availability: Arc<AvailabilityService>,
    pub broadcaster: Arc<BroadcastCoordinator>,
    pub metrics: Arc<Metrics>,
    pub rate_limit: Option<RateLimit>,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        reservations: Arc<dyn ReservationRepository>,
        events: broadcast::Sender<ReservationEvent>,
        rules: &BusinessRules,
        broadcast: &BroadcastConfig,
    ) -> Result<Self, prometheus::Error> {
        let metrics = Arc::new(Metrics::new()?);
        let policy = HoldPolicy::from_ttl_seconds(rules.hold_ttl_seconds);

        let availability = Arc::new(AvailabilityService::new(
            catalog.clone(),
            reservations.clone(),
            metrics.clone(),
            policy,
        ));
        let broadcaster = Arc::new(BroadcastCoordinator::new(
            availability.clone(),
            metrics.clone(),
            broadcast_settings(broadcast),
        ));
        let reservations = Arc::new(ReservationService::new(
            reservations,
            catalog,
            events,
            metrics.clone(),
            policy,
        ));

        Ok(Self {
            reservations,
            availability,
            broadcaster,
            metrics,
            rate_limit: None,
        })
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, per_minute: i64) -> Self {
        self.rate_limit = Some(RateLimit { redis, per_minute });
        self
    }
}

fn broadcast_settings(config: &BroadcastConfig) -> BroadcastSettings {
    BroadcastSettings {
        interval: Duration::from_secs(config.interval_seconds.max(1)),
        query_timeout: Duration::from_millis(config.query_timeout_ms),
        min_push_interval: Duration::from_millis(config.min_push_interval_ms),
        max_consecutive_failures: config.max_consecutive_failures.max(1),
        outbox_capacity: config.outbox_capacity.max(1),
    }
}

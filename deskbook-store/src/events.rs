use deskbook_shared::models::events::RESERVATION_EVENTS_CHANNEL;
use deskbook_shared::ReservationEvent;
use futures_util::{Stream, StreamExt};
use tracing::{debug, error, warn};

use crate::redis_repo::RedisClient;

/// Carries reservation events between instances over Redis pub/sub.
#[derive(Clone)]
pub struct EventRelay {
    redis: RedisClient,
}

impl EventRelay {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    pub async fn publish(&self, event: &ReservationEvent) -> Result<(), redis::RedisError> {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode reservation event: {}", e);
                return Ok(());
            }
        };

        self.redis.publish(RESERVATION_EVENTS_CHANNEL, &payload).await?;
        debug!("Relayed {:?} for booking {}", event.kind, event.reservation_id);
        Ok(())
    }

    /// Events published by any instance, this one included.
    pub async fn subscribe(&self) -> Result<impl Stream<Item = ReservationEvent> + Send, redis::RedisError> {
        let payloads = self.redis.subscribe(RESERVATION_EVENTS_CHANNEL).await?;
        Ok(payloads.filter_map(|payload| async move {
            serde_json::from_str::<ReservationEvent>(&payload)
                .map_err(|e| warn!("Ignoring malformed reservation event: {}", e))
                .ok()
        }))
    }
}

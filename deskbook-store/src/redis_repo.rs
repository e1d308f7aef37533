use futures_util::{Stream, StreamExt};
use redis::{AsyncCommands, RedisResult};
use tracing::{info, warn};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns `true` while `key` is within `limit`
    /// hits for the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish::<_, _, ()>(channel, payload).await
    }

    /// Payloads published on `channel` from now on.
    pub async fn subscribe(&self, channel: &str) -> RedisResult<impl Stream<Item = String> + Send> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        info!("Subscribed to redis channel {}", channel);

        Ok(pubsub.into_on_message().filter_map(|msg| async move {
            msg.get_payload::<String>()
                .map_err(|e| warn!("Dropping unreadable pub/sub payload: {}", e))
                .ok()
        }))
    }
}

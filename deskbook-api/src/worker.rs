use std::sync::Arc;

use deskbook_booking::ReservationService;
use deskbook_shared::ReservationEvent;
use deskbook_store::EventRelay;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

const RELAY_RETRY: Duration = Duration::from_secs(5);

/// Periodically delete holds that outlived their TTL.
pub async fn start_hold_reaper(reservations: Arc<ReservationService>, every: Duration) {
    if reservations.policy().ttl().is_none() {
        info!("Hold expiry disabled, reaper not started");
        return;
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Hold reaper started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        if let Err(e) = reservations.reap_expired_holds().await {
            error!("Hold reaper sweep failed: {}", e);
        }
    }
}

/// Mirror reservation events between this instance and its peers.
///
/// Local events (stamped with `origin`) are published to Redis; events from
/// other instances are fed into the local channel so this instance's
/// broadcaster refreshes its own viewers.
pub async fn start_event_relay(relay: EventRelay, events: broadcast::Sender<ReservationEvent>, origin: Uuid) {
    let outbound = relay.clone();
    let mut local = events.subscribe();
    tokio::spawn(async move {
        loop {
            match local.recv().await {
                Ok(event) if event.origin == origin => {
                    if let Err(e) = outbound.publish(&event).await {
                        warn!("Failed to relay event for booking {}: {}", event.reservation_id, e);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event relay lagged, {} local events not relayed", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    loop {
        match relay.subscribe().await {
            Ok(stream) => {
                info!("Event relay listening for peer instances");
                let mut stream = Box::pin(stream);
                while let Some(event) = stream.next().await {
                    if event.origin != origin {
                        // No local receivers just means nobody is watching.
                        let _ = events.send(event);
                    }
                }
                warn!("Event relay subscription ended, reconnecting");
            }
            Err(e) => error!("Event relay failed to subscribe: {}", e),
        }
        sleep(RELAY_RETRY).await;
    }
}

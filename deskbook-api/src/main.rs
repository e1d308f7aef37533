use anyhow::Context;
use deskbook_api::{app, worker, AppState};
use deskbook_store::app_config::Config;
use deskbook_store::{DbClient, EventRelay, PgCatalogRepository, PgReservationRepository, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "deskbook_api=debug,deskbook_booking=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Deskbook API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
    }

    let rules = match db.fetch_business_rules(config.business_rules.clone()).await {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!("Using configured business rules, table lookup failed: {}", e);
            config.business_rules.clone()
        }
    };
    tracing::info!(
        "Hold TTL {}s, reaper every {}s",
        rules.hold_ttl_seconds,
        rules.reaper_interval_seconds
    );

    let (events_tx, _) = broadcast::channel(256);
    let mut state = AppState::new(
        Arc::new(PgCatalogRepository::new(db.pool.clone())),
        Arc::new(PgReservationRepository::new(db.pool.clone())),
        events_tx.clone(),
        &rules,
        &config.broadcast,
    )?;

    if let Some(redis_config) = &config.redis {
        let redis = RedisClient::new(&redis_config.url)
            .await
            .context("Failed to connect to Redis")?;
        tokio::spawn(worker::start_event_relay(
            EventRelay::new(redis.clone()),
            events_tx.clone(),
            state.reservations.origin(),
        ));
        state = state.with_rate_limit(Arc::new(redis), redis_config.rate_limit_per_minute);
    }

    tokio::spawn(state.broadcaster.clone().run(events_tx.subscribe()));
    tokio::spawn(worker::start_hold_reaper(
        state.reservations.clone(),
        Duration::from_secs(rules.reaper_interval_seconds.max(1)),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

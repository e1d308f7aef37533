use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod desks;
pub mod error;
pub mod holds;
pub mod live;
pub mod state;
pub mod worker;

use error::AppError;
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::USER_AGENT]);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/desks", get(desks::list_desks))
        .route(
            "/api/desks/hold",
            post(holds::hold_desk).delete(holds::release_hold_by_body),
        )
        .route("/api/desks/hold/{booking_id}", delete(holds::release_hold))
        .route("/api/desks/confirm", post(bookings::confirm_booking))
        .route("/api/desks/user-bookings", get(bookings::user_bookings))
        .route("/api/hold/status/{desk_id}/{slot_id}", get(holds::hold_status))
        .route("/api/ws", get(live::live_updates))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .encode()
        .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Per-client-IP fixed window. Off without Redis; fails open on Redis errors.
async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(limit) = &state.rate_limit else {
        return next.run(req).await;
    };
    let Some(addr) = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match limit.redis.check_rate_limit(&key, limit.per_minute, 60).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!("Rate limit exceeded for {}", addr.ip());
            let status = StatusCode::TOO_MANY_REQUESTS;
            (
                status,
                Json(json!({ "error": "Rate limit exceeded", "status_code": status.as_u16() })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}

//! HTTP routes: the WebSocket endpoint, the stats snapshot and a health check.

use std::collections::BTreeMap;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use hub::{CheckResult, HealthState, HealthStatus, Hub, HubStats};

use crate::connection::WsConnection;
use crate::error::{ApiError, Result};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
}

/// Build the router for a running hub.
pub fn router(hub: Hub) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/ws/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(AppState { hub })
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    if !state.hub.is_running() {
        return Err(ApiError::Unavailable);
    }

    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    tracing::info!("WebSocket upgrade request from user {:?}", user_id);

    let hub = state.hub;
    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(e) = hub.connect(WsConnection::new(socket), user_id).await {
            tracing::warn!("Failed to register WebSocket session: {}", e);
        }
    }))
}

/// GET /ws/stats
async fn stats_handler(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let stats = state.hub.stats();
    let running = state.hub.is_running();

    let mut checks = BTreeMap::new();
    checks.insert(
        "scheduler".to_string(),
        CheckResult {
            status: if running {
                HealthState::Healthy
            } else {
                HealthState::Unhealthy
            },
            message: Some(format!("{} active sessions", stats.active_connections)),
            duration_ms: 0,
            last_checked: Utc::now(),
        },
    );

    let report = HealthStatus::from_checks(state.hub.config().version.clone(), stats.uptime_secs, checks);
    let status = if report.status == HealthState::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

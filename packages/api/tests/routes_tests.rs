#![allow(clippy::disallowed_methods)]

use std::error::Error;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use hub::{memory_pair, Hub, HubConfig};
use serde_json::Value;
use tower::ServiceExt;

async fn get_json(hub: &Hub, uri: &str) -> Result<(StatusCode, Value), Box<dyn Error>> {
    let response = api::router(hub.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn test_stats_endpoint() -> Result<(), Box<dyn Error>> {
    let (hub, _scheduler) = Hub::start(HubConfig::default()).await?;
    let (conn, mut peer) = memory_pair();
    hub.connect(conn, Some("alice".into())).await?;
    peer.next_message().await.ok_or("no welcome")?;

    let (status, stats) = get_json(&hub, "/ws/stats").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["active_connections"], 1);
    assert_eq!(stats["total_connections"], 1);
    assert_eq!(stats["message_count"], 0);
    Ok(())
}

#[tokio::test]
async fn test_health_tracks_scheduler() -> Result<(), Box<dyn Error>> {
    let (hub, scheduler) = Hub::start(HubConfig::default()).await?;

    let (status, report) = get_json(&hub, "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "healthy");
    assert_eq!(report["checks"]["scheduler"]["status"], "healthy");

    hub.shutdown().await?;
    scheduler.await?;

    let (status, report) = get_json(&hub, "/health").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(report["status"], "unhealthy");
    Ok(())
}

#[tokio::test]
async fn test_websocket_route_requires_upgrade() -> Result<(), Box<dyn Error>> {
    let (hub, _scheduler) = Hub::start(HubConfig::default()).await?;

    let response = api::router(hub)
        .oneshot(Request::builder().uri("/ws").body(Body::empty())?)
        .await?;
    assert!(response.status().is_client_error());
    Ok(())
}

//! Server initialization for the dashboard hub.

use hub::{Hub, HubConfig};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::routes::router;

/// Start the hub from `HUB_*` environment variables.
///
/// This should be called once at server startup; the returned hub is then
/// handed to the router and to every publisher.
pub async fn init_hub() -> Result<(Hub, JoinHandle<()>)> {
    tracing::info!("Initializing dashboard hub...");

    let config = HubConfig::from_env()?;
    let (hub, scheduler) = Hub::start(config).await?;

    tracing::info!("Dashboard hub initialized ({})", hub.config().service_name);
    Ok((hub, scheduler))
}

/// Serve the routes until `shutdown` resolves, then close every session.
pub async fn serve(
    listener: TcpListener,
    hub: Hub,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(hub.clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    let closed = hub.shutdown().await?;
    tracing::info!("Closed {} sessions", closed);
    Ok(())
}

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use dashdrop_core::{Config, RequestService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashdrop=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let service = Arc::new(RequestService::from_config(&config)?);

    if service.request_permission() {
        info!("Native notifications enabled");
    } else {
        info!("Native notifications disabled ({})", service.dispatcher().permission());
    }

    let app = routes::router(service.clone());

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("DashDrop server listening on {} ({} store)", addr, config.store);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(realtime) = service.realtime() {
        realtime.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

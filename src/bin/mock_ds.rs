use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{debug, info};

use genre_recommendation::{config, mock_service, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_path = config::load_dotenv();
    observability::install_panic_hook();
    let _telemetry = observability::init("mock-ds")?;
    debug!(path = ?dotenv_path, "environment loaded");

    let port = mock_service::port_from_env()?;
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

    info!(%bind_addr, "mock DS service listening");
    info!("  - POST /predict");
    info!("  - GET  /health");

    axum::serve(listener, mock_service::router())
        .with_graceful_shutdown(mock_service::shutdown_signal())
        .await
        .context("mock DS server exited with error")?;

    info!("Server shutdown complete");
    Ok(())
}

use anyhow::Context;
use clap::Parser;
use sentio_server::startup::{init_logging, shutdown_signal};
use sentio_server::{create_router, Cli, EmotionService, SentioConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = SentioConfig::load(&cli).context("failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("Starting sentio-server {}", env!("CARGO_PKG_VERSION"));
    let addr = config.bind_addr();

    let service = tokio::task::spawn_blocking(move || EmotionService::start(config))
        .await
        .context("service startup task failed")??;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, create_router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .context("service shutdown task failed")?;
    info!("sentio-server stopped");
    Ok(())
}

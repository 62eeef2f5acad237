use std::sync::Arc;

use anyhow::Context;

use ledgerbatch_api::app::{build_app, services};
use ledgerbatch_infra::BatchConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledgerbatch_observability::init();

    let config = BatchConfig::from_env().context("loading configuration")?;
    let services = Arc::new(services::build_services(config.clone())?);
    let scheduler = services.start_scheduler()?;

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    if let Some(handle) = scheduler {
        tokio::task::spawn_blocking(move || handle.shutdown()).await?;
    }
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

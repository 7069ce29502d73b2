use anyhow::Context;
use clap::Parser;

use traffic_dashboard::{config::Settings, logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    settings.validate()?;

    logging::init(&settings.log_file, settings.log_max_bytes, settings.log_backups)?;

    // Fetch and model failures are logged inside; we still serve.
    let ctx = server::AppContext::load(&settings).await;

    let addr = settings.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    server::serve(listener, ctx, shutdown_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use testbotd::{api, telemetry, BotConfig, BotContext, Cli};
use tokio::signal;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json, Level::INFO);

    let config = BotConfig::from_cli(&cli)?;
    info!(
        listen = %config.listen,
        source_dir = %config.pipeline.source_dir.display(),
        mainline_ref = %config.mainline_ref,
        "starting testbotd"
    );

    let ctx = Arc::new(BotContext::from_config(config));
    let listener = tokio::net::TcpListener::bind(ctx.config().listen)
        .await
        .with_context(|| format!("binding {}", ctx.config().listen))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, api::router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}

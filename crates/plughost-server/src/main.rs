use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use plughost_runtime::{HostPaths, HostSlot, PluginHost};
use plughost_server::{api, logging, plugins};

/// HTTP front-end hosting one plugin: webhooks, topic delivery, callbacks
/// and OAuth.
#[derive(Debug, Parser)]
#[command(name = "plughost-server", version)]
struct Args {
    /// Plugin to host.
    #[arg(long, env = "PLUGHOST_PLUGIN")]
    plugin: String,

    #[arg(long, env = "PLUGHOST_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Debug logging and platform request tracing.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let paths = HostPaths::from_env();
    let _log_guard = logging::init(&logging::LogDestination::for_plugin(&paths, &args.plugin), args.debug)?;

    let slot = HostSlot::new();
    let host = PluginHost::load(&slot, &plugins::catalog(), &paths, &args.plugin, args.debug)
        .with_context(|| format!("failed to load plugin \"{}\"", args.plugin))?;

    let app = api::router(Arc::new(host));
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, plugin = %args.plugin, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

//! `plughost` command line: run one plugin method, or listen for pub/sub
//! events until a configuration error stops the loop.

use clap::{ArgGroup, Parser};
use plughost_runtime::{HostError, HostPaths, HostSlot, PluginCatalog, PluginHost};

/// Run a plugin method, or listen for pub/sub events forever.
#[derive(Debug, Parser)]
#[command(name = "plughost", version)]
#[command(group(ArgGroup::new("mode").required(true).args(["method", "listen"])))]
pub struct Cli {
    /// Plugin to load.
    pub plugin: String,

    /// Method to run once.
    pub method: Option<String>,

    /// Subscribe to the configured message bus and dispatch events.
    #[arg(long)]
    pub listen: bool,

    /// Debug logging, platform request tracing and detailed errors.
    #[arg(long)]
    pub debug: bool,
}

/// Load the plugin and run the selected mode. `--listen` only comes back
/// with the error that ended the subscription loop.
pub async fn run(cli: &Cli, catalog: &PluginCatalog, paths: &HostPaths) -> Result<(), HostError> {
    let slot = HostSlot::new();
    let host = PluginHost::load(&slot, catalog, paths, &cli.plugin, cli.debug)?;

    match &cli.method {
        Some(method) if !cli.listen => host.run_method(method).await,
        _ => Err(host.listen_forever().await),
    }
}

/// `Kind: message`, or `Kind: <debug chain>` with `--debug`.
pub fn failure_line(err: &HostError, debug: bool) -> String {
    if debug {
        format!("{}: {err:?}", err.kind())
    } else {
        format!("{}: {}", err.kind(), err.message())
    }
}

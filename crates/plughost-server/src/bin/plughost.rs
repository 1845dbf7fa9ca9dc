use std::process::ExitCode;

use clap::Parser;
use plughost_runtime::HostPaths;
use plughost_server::cli::{failure_line, run, Cli};
use plughost_server::{logging, plugins};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let paths = HostPaths::from_env();
    let _log_guard = match logging::init(&logging::LogDestination::for_plugin(&paths, &cli.plugin), cli.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &plugins::catalog(), &paths).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(plugin = %cli.plugin, kind = e.kind(), "{}", e.message());
            eprintln!("{}", failure_line(&e, cli.debug));
            ExitCode::FAILURE
        }
    }
}

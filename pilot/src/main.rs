//! stackpilot command-line entry point

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use stackpilot::app::run::run;
use stackpilot::cli::Cli;
use stackpilot::console::{describe_error, print_error};
use stackpilot::logs::{init_logging, LogOptions};

fn setup(cli: &Cli) -> anyhow::Result<()> {
    init_logging(LogOptions::for_verbosity(cli.verbose, cli.json_logs)).context("failed to initialize logging")?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup(&cli) {
        eprintln!("{:#}", e);
    }
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIME"),
        "pilot starting"
    );

    match run(cli, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}

//! Command dispatch

use std::future::Future;

use tracing::debug;

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::cli::{Cli, Command};
use crate::commands;
use crate::errors::PilotError;
use crate::storage::layout::ConfigLayout;
use crate::storage::profiles::ProfileStore;

/// Run one command to completion
pub async fn run(cli: Cli, shutdown_signal: impl Future<Output = ()> + Send + 'static) -> Result<(), PilotError> {
    let options = AppOptions::from(&cli);
    debug!("Running {:?} with {:?}", cli.command, options);

    match cli.command {
        Command::Config(args) => {
            let mut store = ProfileStore::load(ConfigLayout::from_env()?.profiles_file()).await;
            commands::config::execute(&args, &mut store).await
        }
        Command::Deploy(args) => {
            let state = AppState::init(options).await?;
            commands::deploy::execute(&state, &args).await
        }
        Command::Ps(args) => {
            let state = AppState::init(options).await?;
            commands::ps::execute(&state, &args).await
        }
        Command::Logs(args) => {
            let state = AppState::init(options).await?;
            commands::logs::execute(&state, &args, shutdown_signal).await
        }
        Command::Remove(args) => {
            let state = AppState::init(options).await?;
            commands::remove::execute(&state, &args).await
        }
    }
}

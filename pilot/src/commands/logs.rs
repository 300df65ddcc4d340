//! `pilot logs`

use std::future::Future;

use crate::app::state::AppState;
use crate::cli::LogsArgs;
use crate::console::{print_warning, LoggerFactory};
use crate::errors::PilotError;
use crate::logstream::{self, StreamOptions};

pub async fn execute(
    state: &AppState,
    args: &LogsArgs,
    shutdown_signal: impl Future<Output = ()>,
) -> Result<(), PilotError> {
    let options = StreamOptions {
        tail: args.tail,
        follow: args.follow,
        all: args.all,
        resources: args.resources.clone(),
    };

    let containers = logstream::select_containers(state.runtime.as_ref(), &state.stack.name, &options).await?;
    if containers.is_empty() {
        print_warning(&format!("No containers found for stack {}", state.stack.name));
        return Ok(());
    }

    let loggers = LoggerFactory::new();
    if options.follow {
        logstream::follow(state.runtime.clone(), containers, options.tail, &loggers, shutdown_signal).await?;
    } else {
        logstream::snapshot(state.runtime.as_ref(), &containers, options.tail, &loggers).await?;
    }
    Ok(())
}

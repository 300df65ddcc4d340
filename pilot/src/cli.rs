//! Command-line interface definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::storage::stack::{DEFAULT_PROFILE, DEFAULT_STACK_FILE};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Deploy a stack of containerized resources to one container engine
#[derive(Parser, Debug)]
#[command(name = "pilot", version, long_version = LONG_VERSION)]
pub struct Cli {
    /// Stack file; given before the subcommand, `logs -f` is follow
    #[arg(short = 'f', long = "file", env = "PILOT_STACK_FILE", default_value = DEFAULT_STACK_FILE)]
    pub stack_file: PathBuf,

    /// Deployment profile
    #[arg(short, long, env = "PILOT_PROFILE", default_value = DEFAULT_PROFILE, global = true)]
    pub profile: String,

    /// Enable debug diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit diagnostics as JSON
    #[arg(long, global = true, hide = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and start the stack's resources
    Deploy(DeployArgs),

    /// List the stack's containers
    Ps(PsArgs),

    /// Show container output
    Logs(LogsArgs),

    /// Remove every container of the stack
    Remove(RemoveArgs),

    /// Save or list deployment profiles
    Config(ConfigArgs),
}

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Deploy only these resources
    #[arg(short, long = "resources", num_args = 1..)]
    pub resources: Vec<String>,

    /// Answer every question with its default
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug, Default)]
pub struct PsArgs {
    /// Include stopped containers
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Lines of history per container
    #[arg(short, long, default_value_t = 100)]
    pub tail: usize,

    /// Keep streaming new output
    #[arg(short, long)]
    pub follow: bool,

    /// Only these resources
    #[arg(short, long = "resources", num_args = 1..)]
    pub resources: Vec<String>,

    /// Include stopped containers
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args, Debug, Default)]
pub struct RemoveArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Profile name
    #[arg(long)]
    pub name: Option<String>,

    /// Container engine host
    #[arg(long)]
    pub host: Option<String>,

    /// Container engine port
    #[arg(long)]
    pub port: Option<u16>,

    /// Runtime mode
    #[arg(long)]
    pub mode: Option<String>,

    /// Stage name
    #[arg(long)]
    pub stage: Option<String>,

    /// Containers kept per resource
    #[arg(long)]
    pub keep: Option<usize>,
}

impl ConfigArgs {
    /// Whether any profile field was given
    pub fn has_changes(&self) -> bool {
        self.host.is_some() || self.port.is_some() || self.mode.is_some() || self.stage.is_some() || self.keep.is_some()
    }
}

//! Application options

use std::path::PathBuf;

use crate::cli::Cli;
use crate::deploy::bootstrap;
use crate::storage::stack::{DEFAULT_PROFILE, DEFAULT_STACK_FILE};

/// Options shared by every stack command
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Stack file path
    pub stack_file: PathBuf,

    /// Profile name
    pub profile: String,

    /// Management service bootstrap
    pub bootstrap: bootstrap::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            stack_file: PathBuf::from(DEFAULT_STACK_FILE),
            profile: DEFAULT_PROFILE.to_string(),
            bootstrap: bootstrap::Options::default(),
        }
    }
}

impl From<&Cli> for AppOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            stack_file: cli.stack_file.clone(),
            profile: cli.profile.clone(),
            ..Default::default()
        }
    }
}

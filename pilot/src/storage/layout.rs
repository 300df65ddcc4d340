//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::errors::PilotError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Directory name of per-user configuration
const CONFIG_DIR_NAME: &str = "stackpilot";

/// Folder under the project root holding generated build contexts
const DEPLOY_DIR_NAME: &str = ".deploy";

/// Project-side layout: the stack file and its generated build contexts
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Directory holding the stack file
    pub root: PathBuf,
}

impl ProjectLayout {
    /// Layout of the project owning `stack_file`
    pub fn for_stack_file(stack_file: &Path) -> Self {
        let root = stack_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { root }
    }

    /// Root of every generated build context
    pub fn deploy_root(&self) -> Dir {
        Dir::new(self.root.join(DEPLOY_DIR_NAME))
    }

    /// Build context of one resource
    pub fn deploy_dir(&self, resource: &str) -> Dir {
        self.deploy_root().subdir(resource)
    }
}

/// Per-user configuration layout
#[derive(Debug, Clone)]
pub struct ConfigLayout {
    /// Base directory for user configuration
    pub base_dir: PathBuf,
}

impl ConfigLayout {
    /// Create a new configuration layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Platform default, `~/.config/stackpilot` on Linux
    pub fn from_env() -> Result<Self, PilotError> {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| PilotError::ConfigError("unable to locate a configuration directory".to_string()))?;
        Ok(Self::new(base.join(CONFIG_DIR_NAME)))
    }

    /// Named profiles saved with `pilot config`
    pub fn profiles_file(&self) -> File {
        File::new(self.base_dir.join("config.yaml"))
    }
}

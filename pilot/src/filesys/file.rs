//! Single-file reads and atomic writes

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::PilotError;

/// A file by path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    pub async fn read_string(&self) -> Result<String, PilotError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    pub async fn read_yaml<T: DeserializeOwned>(&self) -> Result<T, PilotError> {
        Ok(serde_yaml::from_str(&self.read_string().await?)?)
    }

    /// Replace the contents, creating parent folders as needed.
    ///
    /// Written to a sibling `.tmp` file first and renamed over the target, so
    /// readers see either the old or the new contents.
    pub async fn write_string(&self, contents: &str) -> Result<(), PilotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("tmp");

        let mut file = fs::File::create(&staging).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    pub async fn write_yaml<T: Serialize>(&self, value: &T) -> Result<(), PilotError> {
        self.write_string(&serde_yaml::to_string(value)?).await
    }

    /// Owner read/write only (0o600); a no-op off Unix
    pub async fn restrict_to_owner(&self) -> Result<(), PilotError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }
}

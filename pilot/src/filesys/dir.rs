//! Deploy folders and build-context copies

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::fs;

use crate::errors::PilotError;
use crate::filesys::file::File;

/// Entries never copied into a build context
const IGNORED_ENTRIES: &[&str] = &[".git", ".deploy", "node_modules", "__pycache__", ".venv"];

/// A directory by path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), PilotError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Remove the directory tree; missing is fine
    pub async fn delete(&self) -> Result<(), PilotError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Delete and re-create the directory empty
    pub async fn reset(&self) -> Result<(), PilotError> {
        self.delete().await?;
        self.create().await
    }

    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Copy every entry of this directory into `dest`, recursively.
    ///
    /// VCS metadata, dependency folders and deploy folders are skipped, and
    /// `dest` itself is never descended into when it lives inside `self`.
    /// Returns the number of files copied.
    pub async fn copy_into(&self, dest: &Dir) -> Result<usize, PilotError> {
        dest.create().await?;
        let dest_root = fs::canonicalize(dest.path()).await?;
        copy_tree(self.path.clone(), dest.path.clone(), dest_root).await
    }
}

fn copy_tree(src: PathBuf, dest: PathBuf, dest_root: PathBuf) -> BoxFuture<'static, Result<usize, PilotError>> {
    async move {
        let mut copied = 0;
        let mut entries = fs::read_dir(&src).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if IGNORED_ENTRIES.iter().any(|ignored| name == *ignored) {
                continue;
            }

            let path = entry.path();
            let target = dest.join(&name);
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                if fs::canonicalize(&path).await? == dest_root {
                    continue;
                }
                fs::create_dir_all(&target).await?;
                copied += copy_tree(path, target, dest_root.clone()).await?;
            } else if file_type.is_file() {
                fs::copy(&path, &target).await?;
                copied += 1;
            }
        }

        Ok(copied)
    }
    .boxed()
}

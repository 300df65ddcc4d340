//! Build context preparation and packing

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::PilotError;
use crate::filesys::dir::Dir;
use crate::models::resource::Resource;
use crate::templates::Template;

/// Directory every context entry except the Dockerfile is placed under
const APP_PREFIX: &str = "app";

pub const DOCKERFILE: &str = "Dockerfile";

/// Reset the deploy folder, copy the code tree and let the template write its files.
///
/// Generated files are written after the copy, so they win over project files
/// of the same name.
pub async fn prepare(resource: &mut Resource, template: &dyn Template) -> Result<(), PilotError> {
    let deploy = Dir::new(&resource.folders.deploy);
    deploy.reset().await?;

    if let Some(code) = resource.folders.code.clone() {
        let code = Dir::new(code);
        if !code.exists().await {
            return Err(PilotError::ConfigError(format!(
                "code folder of '{}' does not exist: {}",
                resource.name,
                code.path().display()
            )));
        }
        let copied = code.copy_into(&deploy).await?;
        debug!("Copied {} files into {}", copied, deploy.path().display());
    }

    template.prepare(resource).await
}

/// Substitute `{handler}`, `{port}` and `{imageName}`.
///
/// Values come from the resource first, then its props; a placeholder with
/// no known value is left untouched.
pub fn render_dockerfile(source: &str, resource: &Resource, port: Option<u16>) -> String {
    let mut text = source.to_string();
    for key in ["handler", "port", "imageName"] {
        let placeholder = format!("{{{}}}", key);
        if !text.contains(&placeholder) {
            continue;
        }
        let own = match key {
            "handler" => resource.handler.clone(),
            "port" => port.map(|p| p.to_string()),
            _ => None,
        };
        let value = own.or_else(|| {
            resource.props.get(key).and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        });
        if let Some(value) = value {
            text = text.replace(&placeholder, &value);
        }
    }
    text
}

/// Write the Dockerfile and pack the deploy folder into a tar archive
pub async fn write_and_pack(deploy: &Path, dockerfile: &str) -> Result<Vec<u8>, PilotError> {
    Dir::new(deploy).file(DOCKERFILE).write_string(dockerfile).await?;

    let root = deploy.to_path_buf();
    tokio::task::spawn_blocking(move || pack(&root))
        .await
        .map_err(|e| PilotError::Internal(format!("context packing task failed: {}", e)))?
}

/// Tar `root`: `Dockerfile` at the archive root, everything else under `app/`.
///
/// Links to files are packed as the file; links to directories are skipped.
pub fn pack(root: &Path) -> Result<Vec<u8>, PilotError> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(true);

    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .map_err(|e| PilotError::Internal(e.to_string()))?;

            let name = if relative == Path::new(DOCKERFILE) {
                PathBuf::from(DOCKERFILE)
            } else {
                Path::new(APP_PREFIX).join(relative)
            };

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                builder.append_dir(&name, &path)?;
                pending.push(path);
            } else if file_type.is_symlink() && !path.is_file() {
                // Linked directories could loop; dangling links have no content
                debug!("Skipping link {}", path.display());
            } else {
                builder.append_path_with_name(&path, &name)?;
            }
        }
    }

    builder.finish()?;
    Ok(builder.into_inner()?)
}

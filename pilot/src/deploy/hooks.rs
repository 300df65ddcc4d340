//! Shell commands run on the deploying machine

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::PilotError;

/// Captured result of a shell command
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// stdout and stderr, trimmed and joined
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run `command` through the shell in `cwd`, capturing its output
pub async fn run_shell(
    command: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> Result<ShellOutput, PilotError> {
    debug!("Running '{}' in {}", command, cwd.display());

    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    let output = cmd
        .current_dir(cwd)
        .envs(env)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| PilotError::PreDeployError(format!("failed to run '{}': {}", command, e)))?;

    Ok(ShellOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a resource's pre-deploy hook; a non-zero exit is an error carrying the output
pub async fn run_pre_deploy(
    command: &str,
    project: &Path,
    env: &BTreeMap<String, String>,
) -> Result<ShellOutput, PilotError> {
    info!("Running pre-deploy hook: {}", command);
    let output = run_shell(command, project, env).await?;
    if !output.success {
        let code = output
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(PilotError::PreDeployError(format!(
            "'{}' exited with {}: {}",
            command,
            code,
            output.combined()
        )));
    }
    Ok(output)
}

//! Version assignment from deployment history and live containers

use crate::errors::PilotError;
use crate::runtime::{ContainerFilter, ContainerRuntime, ContainerSummary};

/// Version encoded in a container name of the exact form `<fullName>-<digits>`
pub fn parse_version(container_name: &str, full_name: &str) -> Option<u64> {
    let digits = container_name.strip_prefix(full_name)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Resource name and version of a `<name>-<stack>-<version>` container
pub fn parse_container_name(container_name: &str, stack: &str) -> Option<(String, u64)> {
    let (rest, _) = container_name.rsplit_once('-')?;
    let name = rest.strip_suffix(stack)?.strip_suffix('-')?;
    if name.is_empty() {
        return None;
    }
    let version = parse_version(container_name, rest)?;
    Some((name.to_string(), version))
}

/// Highest version among `containers` belonging to `full_name`, 0 when none
pub fn max_live_version(containers: &[ContainerSummary], full_name: &str) -> u64 {
    containers
        .iter()
        .filter_map(|c| parse_version(&c.name, full_name))
        .max()
        .unwrap_or(0)
}

/// Next version: one past both the recorded and the live maximum
pub fn next_version(last_recorded: u64, max_live: u64) -> u64 {
    last_recorded.max(max_live) + 1
}

/// Assign the next version of `full_name`, consulting the runtime for live containers
pub async fn assign_version(
    runtime: &dyn ContainerRuntime,
    full_name: &str,
    last_recorded: u64,
) -> Result<u64, PilotError> {
    let containers = runtime
        .list_containers(&ContainerFilter::prefix(format!("{}-", full_name)))
        .await?;
    Ok(next_version(last_recorded, max_live_version(&containers, full_name)))
}

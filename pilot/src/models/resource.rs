//! Resource models

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::deployment::ResourceStatus;

/// A deployable unit of a stack, resolved by the catalog for one invocation
#[derive(Debug, Clone)]
pub struct Resource {
    /// Name, unique within the stack
    pub name: String,

    /// Owning stack name
    pub stack: String,

    /// Template kind used to generate the build context
    pub template: String,

    /// Entry point handed to the template (file, `file.function`, command)
    pub handler: Option<String>,

    pub description: Option<String>,

    /// Container build/run settings
    pub spec: BuildSpec,

    /// Environment passed to the container
    pub environment: BTreeMap<String, String>,

    /// Template-specific properties
    pub props: serde_json::Map<String, serde_json::Value>,

    /// Command run in the project directory before anything else
    pub pre_deploy: Option<String>,

    /// Whether the resource is routed through the shared proxy
    pub proxy: bool,

    pub folders: ResourceFolders,

    /// Version assigned for this deploy
    pub version: u64,

    pub status: ResourceStatus,

    /// Metadata persisted across deploys
    pub extra: ResourceExtra,

    /// Name this resource was renamed from during this deploy
    pub previous_name: Option<String>,
}

impl Resource {
    /// `<name>-<stack>`, the prefix of every container of this resource
    pub fn full_name(&self) -> String {
        full_name(&self.name, &self.stack)
    }

    /// Full name of the resource this one was renamed from
    pub fn previous_full_name(&self) -> Option<String> {
        self.previous_name
            .as_deref()
            .map(|previous| full_name(previous, &self.stack))
    }

    /// `<fullName>-<version>`
    pub fn container_name(&self) -> String {
        format!("{}-{}", self.full_name(), self.version)
    }

    /// `<fullName>:<version>`, lower-cased
    pub fn image_name(&self) -> String {
        format!("{}:{}", self.full_name(), self.version).to_lowercase()
    }

    /// Hostname inside the container networks
    pub fn hostname(&self) -> String {
        self.spec
            .hostname
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.name, self.stack))
            .to_lowercase()
    }

    /// Prefixes (with trailing `-`) matching every container of this resource,
    /// including those created under a previous name.
    pub fn container_prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![format!("{}-", self.full_name())];
        if let Some(previous) = self.previous_full_name() {
            prefixes.push(format!("{}-", previous));
        }
        prefixes
    }

    /// A string property from `props`
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(|v| v.as_str())
    }
}

/// `<name>-<stack>`
pub fn full_name(name: &str, stack: &str) -> String {
    format!("{}-{}", name, stack)
}

/// Folders a resource is built from
#[derive(Debug, Clone, Default)]
pub struct ResourceFolders {
    /// Directory holding the stack file; hooks run here
    pub project: PathBuf,

    /// Source tree copied into the build context, when the resource has one
    pub code: Option<PathBuf>,

    /// Build context directory
    pub deploy: PathBuf,
}

/// Container build/run settings of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Published host port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub networks: Vec<String>,

    /// CPU share, e.g. `0.5`
    #[serde(default, deserialize_with = "number_or_string")]
    pub cpus: Option<f64>,

    /// Memory limit in MB
    #[serde(default, deserialize_with = "number_or_string")]
    pub memory: Option<f64>,

    /// Restart policy name
    #[serde(default)]
    pub restart: Option<String>,

    #[serde(default, rename = "add-host")]
    pub add_host: Vec<String>,

    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default, rename = "label")]
    pub labels: BTreeMap<String, String>,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{}'", s))),
    }
}

/// Metadata persisted with each resource record across deploys.
///
/// Known keys are typed; anything else is carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceExtra {
    #[serde(rename = "renamedFrom", default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,

    #[serde(rename = "proxyURL", alias = "proxy", default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(rename = "rollbackTarget", default, skip_serializing_if = "Option::is_none")]
    pub rollback_target: Option<String>,

    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl ResourceExtra {
    /// URL shown in summaries: proxy URL, else hostname
    pub fn display_url(&self) -> Option<&str> {
        self.proxy_url.as_deref().or(self.hostname.as_deref())
    }
}

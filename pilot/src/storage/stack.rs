//! Stack file parsing

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::errors::PilotError;
use crate::filesys::file::File;
use crate::models::resource::BuildSpec;
use crate::storage::profiles::{Profile, ProfileStore};

/// Stack file looked up when `-f` is not given
pub const DEFAULT_STACK_FILE: &str = "stack.yaml";

/// Profile used when `-p` is not given
pub const DEFAULT_PROFILE: &str = "default";

/// Declarative description of a stack
#[derive(Debug, Clone, Deserialize)]
pub struct StackFile {
    pub name: String,

    /// Inline profiles, layered over stored profiles of the same name
    #[serde(default)]
    pub profile: BTreeMap<String, Profile>,

    /// Environment shared by every resource
    #[serde(default, deserialize_with = "env_map")]
    pub environment: BTreeMap<String, String>,

    /// Resources in declaration order
    #[serde(default, deserialize_with = "ordered_resources")]
    pub resources: Vec<(String, ResourceConfig)>,
}

/// One resource as declared in the stack file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceConfig {
    pub template: String,

    #[serde(default)]
    pub handler: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Source tree relative to the stack file; the project directory when absent
    #[serde(rename = "codeUri", default)]
    pub code_uri: Option<String>,

    #[serde(rename = "preDeploy", default)]
    pub pre_deploy: Option<String>,

    /// Route through the shared proxy
    #[serde(default)]
    pub proxy: bool,

    #[serde(default)]
    pub spec: BuildSpec,

    #[serde(default, deserialize_with = "env_map")]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub props: serde_json::Map<String, serde_json::Value>,
}

impl StackFile {
    /// Parse a stack file from text
    pub fn parse(text: &str) -> Result<Self, PilotError> {
        let stack: StackFile = serde_yaml::from_str(text)?;
        stack.validate()?;
        Ok(stack)
    }

    /// Read and parse a stack file
    pub async fn load(path: &Path) -> Result<Self, PilotError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(PilotError::ConfigError(format!(
                "stack file not found: {}",
                path.display()
            )));
        }
        let text = file.read_string().await?;
        Self::parse(&text)
    }

    fn validate(&self) -> Result<(), PilotError> {
        if !is_valid_name(&self.name) {
            return Err(PilotError::ConfigError(format!(
                "invalid stack name '{}': use letters, digits, '_' and '.'",
                self.name
            )));
        }
        for (name, config) in &self.resources {
            if !is_valid_name(name) {
                return Err(PilotError::ConfigError(format!(
                    "invalid resource name '{}': use letters, digits, '_' and '.'",
                    name
                )));
            }
            if config.template.trim().is_empty() {
                return Err(PilotError::ConfigError(format!(
                    "resource '{}' does not name a template",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Resolve the named profile: the inline profile layered over the stored one.
    ///
    /// The default profile resolves to an empty (local engine) profile when
    /// neither source defines it; any other unknown name is an error.
    pub fn resolve_profile(&self, name: &str, store: &ProfileStore) -> Result<Profile, PilotError> {
        let profile = match (self.profile.get(name), store.get(name)) {
            (Some(inline), Some(stored)) => inline.clone().layered_over(stored),
            (Some(inline), None) => inline.clone(),
            (None, Some(stored)) => stored.clone(),
            (None, None) if name == DEFAULT_PROFILE => Profile::default(),
            (None, None) => {
                return Err(PilotError::ConfigError(format!("unknown profile '{}'", name)));
            }
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// Names end up in container names, where `-` separates name, stack and version
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn ordered_resources<'de, D>(deserializer: D) -> Result<Vec<(String, ResourceConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = Option::<serde_yaml::Mapping>::deserialize(deserializer)?.unwrap_or_default();
    mapping
        .into_iter()
        .map(|(key, value)| {
            let name = match key {
                serde_yaml::Value::String(s) => s,
                other => serde_yaml::to_string(&other)
                    .map_err(serde::de::Error::custom)?
                    .trim()
                    .to_string(),
            };
            let config = serde_yaml::from_value::<ResourceConfig>(value)
                .map_err(|e| serde::de::Error::custom(format!("resource '{}': {}", name, e)))?;
            Ok((name, config))
        })
        .collect()
}

/// Environment values may be written as numbers or booleans
fn env_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_yaml::Value::Null => String::new(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::String(s) => s,
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "environment variable '{}' must be a scalar, got {:?}",
                        key, other
                    )))
                }
            };
            Ok((key, text))
        })
        .collect()
}

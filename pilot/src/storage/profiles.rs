//! Deployment profiles and the per-user profile store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::PilotError;
use crate::filesys::file::File;

/// Containers kept per resource after cleanup, when the profile says nothing
pub const DEFAULT_KEEP: usize = 5;

/// Network shared by the management service and proxy-eligible resources
pub const DEFAULT_PROXY_NETWORK: &str = "stackpilot-proxy";

/// Port the management service listens on
pub const DEFAULT_SERVICE_PORT: u16 = 3000;

/// The only supported runtime mode
pub const DOCKER_MODE: &str = "docker";

/// Where and how a stack is deployed.
///
/// Every field is optional so a stack-file profile can be layered over a
/// stored one field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Runtime mode, `docker`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Free-form stage name (`dev`, `prod`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    /// Container engine host; absent means the local engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Container engine port for plain-HTTP hosts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Containers kept per resource after cleanup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,

    /// Management service settings
    #[serde(default, skip_serializing_if = "ServiceSettings::is_empty")]
    pub service: ServiceSettings,
}

impl Profile {
    /// Overlay `self` on `base`; fields set in `self` win
    pub fn layered_over(self, base: &Profile) -> Profile {
        Profile {
            mode: self.mode.or_else(|| base.mode.clone()),
            stage: self.stage.or_else(|| base.stage.clone()),
            host: self.host.or_else(|| base.host.clone()),
            port: self.port.or(base.port),
            keep: self.keep.or(base.keep),
            service: self.service.layered_over(&base.service),
        }
    }

    pub fn mode(&self) -> &str {
        self.mode.as_deref().unwrap_or(DOCKER_MODE)
    }

    /// Retention count
    pub fn keep(&self) -> usize {
        self.keep.unwrap_or(DEFAULT_KEEP)
    }

    /// Reject settings the engine cannot honor
    pub fn validate(&self) -> Result<(), PilotError> {
        if self.mode() != DOCKER_MODE {
            return Err(PilotError::ConfigError(format!(
                "unsupported profile mode '{}', expected '{}'",
                self.mode(),
                DOCKER_MODE
            )));
        }
        Ok(())
    }
}

/// Management service (deployment store and proxy registrar) settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service host, with or without scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Proxy network name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Public host the proxy answers on
    #[serde(rename = "proxyHost", default, skip_serializing_if = "Option::is_none")]
    pub proxy_host: Option<String>,

    /// Image started when the service is not running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ServiceSettings {
    fn is_empty(&self) -> bool {
        self == &ServiceSettings::default()
    }

    fn layered_over(self, base: &ServiceSettings) -> ServiceSettings {
        ServiceSettings {
            host: self.host.or_else(|| base.host.clone()),
            port: self.port.or(base.port),
            network: self.network.or_else(|| base.network.clone()),
            proxy_host: self.proxy_host.or_else(|| base.proxy_host.clone()),
            image: self.image.or_else(|| base.image.clone()),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SERVICE_PORT)
    }

    pub fn network(&self) -> &str {
        self.network.as_deref().unwrap_or(DEFAULT_PROXY_NETWORK)
    }

    /// Base URL of the service API.
    ///
    /// Defaults to the engine host of the profile, or localhost.
    pub fn base_url(&self, engine_host: Option<&str>) -> String {
        let host = self
            .host
            .clone()
            .or_else(|| engine_host.and_then(bare_host))
            .unwrap_or_else(|| "localhost".to_string());

        let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("http://{}", host)
        };

        let authority = with_scheme.split("://").nth(1).unwrap_or_default();
        if authority.contains(':') {
            with_scheme.trim_end_matches('/').to_string()
        } else {
            format!("{}:{}", with_scheme.trim_end_matches('/'), self.port())
        }
    }
}

/// Hostname part of a container engine address, if it names a remote host
fn bare_host(host: &str) -> Option<String> {
    if host.starts_with("unix://") || host.starts_with("npipe://") {
        return None;
    }
    let without_scheme = host.split("://").last().unwrap_or(host);
    let name = without_scheme.split(':').next().unwrap_or(without_scheme);
    let name = name.rsplit('@').next().unwrap_or(name);
    (!name.is_empty()).then(|| name.to_string())
}

/// Named profiles persisted in the user's configuration directory
#[derive(Debug)]
pub struct ProfileStore {
    file: File,
    profiles: BTreeMap<String, Profile>,
}

impl ProfileStore {
    /// Load the store; a missing or unreadable file is an empty store
    pub async fn load(file: File) -> Self {
        let profiles = if file.exists().await {
            match file.read_yaml::<Option<BTreeMap<String, Profile>>>().await {
                Ok(profiles) => profiles.unwrap_or_default(),
                Err(e) => {
                    warn!("Ignoring unreadable profile store {}: {}", file.path().display(), e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        debug!("Loaded {} stored profiles", profiles.len());
        Self { file, profiles }
    }

    /// An empty store backed by `file`
    pub fn empty(file: File) -> Self {
        Self {
            file,
            profiles: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profiles(&self) -> &BTreeMap<String, Profile> {
        &self.profiles
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    /// Insert or replace a profile and persist the store
    pub async fn save(&mut self, name: &str, profile: Profile) -> Result<(), PilotError> {
        profile.validate()?;
        self.profiles.insert(name.to_string(), profile);
        self.file.write_yaml(&self.profiles).await?;
        self.file.restrict_to_owner().await?;
        Ok(())
    }
}

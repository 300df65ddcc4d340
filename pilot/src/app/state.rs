//! Application state shared by the stack commands

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::options::AppOptions;
use crate::errors::PilotError;
use crate::http::client::HttpClient;
use crate::runtime::docker::{DockerRuntime, RuntimeEndpoint};
use crate::runtime::ContainerRuntime;
use crate::storage::layout::{ConfigLayout, ProjectLayout};
use crate::storage::profiles::{Profile, ProfileStore};
use crate::storage::stack::StackFile;

/// Everything a stack command works with
pub struct AppState {
    pub options: AppOptions,

    /// Parsed stack file
    pub stack: StackFile,

    /// Project directory layout
    pub layout: ProjectLayout,

    /// Resolved profile
    pub profile: Profile,

    /// Container engine
    pub runtime: Arc<dyn ContainerRuntime>,

    /// Management service client (deployment store and proxy registrar)
    pub service: Arc<HttpClient>,
}

impl AppState {
    /// Load the stack file and profile, and connect to the engine
    pub async fn init(options: AppOptions) -> Result<Self, PilotError> {
        let stack = StackFile::load(&options.stack_file).await?;
        let layout = ProjectLayout::for_stack_file(&options.stack_file);
        debug!("Loaded stack {} from {}", stack.name, options.stack_file.display());

        let profiles = ProfileStore::load(ConfigLayout::from_env()?.profiles_file()).await;
        let profile = stack.resolve_profile(&options.profile, &profiles)?;

        let endpoint = RuntimeEndpoint::from_profile(profile.host.as_deref(), profile.port)?;
        info!("Using profile {} against {}", options.profile, endpoint);
        let runtime = Arc::new(DockerRuntime::connect(endpoint)?);

        let service = Arc::new(HttpClient::new(&profile.service.base_url(profile.host.as_deref()))?);

        Ok(Self {
            options,
            stack,
            layout,
            profile,
            runtime,
            service,
        })
    }
}

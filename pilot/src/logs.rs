//! Diagnostics logging setup
//!
//! Diagnostics go to stderr so they never interleave with the tables and
//! container output printed on stdout.

use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::PilotError;

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Most verbose level shown when `RUST_LOG` is unset
    pub level: Level,

    /// Emit one JSON object per event
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            json_format: false,
        }
    }
}

impl LogOptions {
    /// Debug diagnostics when `verbose`, warnings otherwise
    pub fn for_verbosity(verbose: bool, json_format: bool) -> Self {
        Self {
            level: if verbose { Level::DEBUG } else { Level::WARN },
            json_format,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(self.level).into()))
    }
}

/// Install the global subscriber; fails when one is already set
pub fn init_logging(options: LogOptions) -> Result<(), PilotError> {
    let registry = tracing_subscriber::registry().with(options.filter());

    let result = if options.json_format {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| PilotError::ConfigError(format!("logging: {}", e)))
}

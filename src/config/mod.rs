// ABOUTME: Configuration types and parsing for dockhand.yml.
// ABOUTME: The optional file supplies defaults; CLI overrides win; resolution yields RunConfig.

mod env_value;
mod server;
mod settings;

pub use env_value::EnvValue;
pub use server::ServerConfig;
pub use settings::{
    AppSettings, DeploymentTarget, Overrides, RunConfig, RunMode, SourceReference, Timeouts,
};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "dockhand.yml";
pub const CONFIG_FILENAME_ALT: &str = "dockhand.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".dockhand/config.yml";

/// Contents of a dockhand.yml file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub token: Option<EnvValue>,

    #[serde(default)]
    pub token_user: Option<String>,

    #[serde(default, deserialize_with = "server::deserialize_server_option")]
    pub server: Option<ServerConfig>,

    #[serde(default)]
    pub remote_dir: Option<String>,

    #[serde(default)]
    pub app_port: Option<u16>,

    #[serde(default)]
    pub host_port: Option<u16>,

    #[serde(default)]
    pub workspace: Option<PathBuf>,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    #[serde(default, with = "humantime_serde")]
    pub connect: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub command: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub settle: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub http: Option<Duration>,
}

impl FileConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look for a config file in `dir`. Absence is not an error.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::load(path).map(Some);
            }
        }

        Ok(None)
    }
}

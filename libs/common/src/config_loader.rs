//! Layered configuration loading
//!
//! Priority (lowest to highest):
//! 1. serde defaults of the target type
//! 2. YAML file (skipped when absent)
//! 3. environment variables with a prefix, `__` separating nested keys

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Generic configuration loader
pub struct ConfigLoader<T>
where
    T: Default + DeserializeOwned + Serialize,
{
    defaults: T,
    env_prefix: Option<String>,
    yaml_path: Option<PathBuf>,
    require_file: bool,
}

impl<T> Default for ConfigLoader<T>
where
    T: Default + DeserializeOwned + Serialize,
{
    fn default() -> Self {
        Self {
            defaults: T::default(),
            env_prefix: None,
            yaml_path: None,
            require_file: false,
        }
    }
}

impl<T> ConfigLoader<T>
where
    T: Default + DeserializeOwned + Serialize,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the built-in defaults
    pub fn with_defaults(mut self, defaults: T) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set environment variable prefix, e.g. `ALERTSRV_`
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Set YAML configuration file path
    pub fn with_yaml_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.yaml_path = Some(path.into());
        self
    }

    /// Fail instead of skipping when the YAML file is missing
    pub fn require_file(mut self) -> Self {
        self.require_file = true;
        self
    }

    /// Build final configuration
    pub fn build(self) -> Result<T> {
        let mut figment = Figment::from(Serialized::defaults(&self.defaults));

        if let Some(path) = &self.yaml_path {
            if path.exists() {
                info!("Loading YAML config file: {}", path.display());
                figment = figment.merge(Yaml::file(path));
            } else if self.require_file {
                return Err(ConfigError::FileNotFound(path.display().to_string()));
            } else {
                debug!("YAML config file not found, skipping: {}", path.display());
            }
        }

        if let Some(prefix) = &self.env_prefix {
            debug!("Applying environment variables, prefix: {}", prefix);
            figment = figment.merge(Env::prefixed(prefix).split("__"));
        }

        figment.extract().map_err(|e| ConfigError::Extract(Box::new(e)))
    }
}

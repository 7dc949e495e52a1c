use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{default_config_path, ConfigError, ProvisioningConfig};

pub struct ConfigLoader {
    path: Option<PathBuf>,
    explicit: bool,
}

impl ConfigLoader {
    /// Loader for `path`, or for the default location when `None`.
    pub fn new(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self {
                path: Some(path.to_path_buf()),
                explicit: true,
            },
            None => Self {
                path: default_config_path(),
                explicit: false,
            },
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the file (a missing default file is not an error), apply
    /// environment overrides and validate.
    pub async fn load(&self) -> Result<ProvisioningConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) if self.explicit || path.exists() => Self::read_file(path).await?,
            _ => {
                debug!("No configuration file found, using defaults");
                ProvisioningConfig::default()
            }
        };

        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    async fn read_file(path: &Path) -> Result<ProvisioningConfig, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<ProvisioningConfig, toml::de::Error> {
        toml::from_str(content)
    }
}

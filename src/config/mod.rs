//! Provisioning service configuration.
//!
//! Values come from, in increasing priority:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, or `provisioning.toml` in the platform config dir)
//! 3. `DATALAB_*` environment variables

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub mod loader;

pub use loader::ConfigLoader;

use crate::listener::ListenerSettings;
use crate::model::{AwsCloudSettings, AzureCloudSettings, CloudProvider, GcpCloudSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Default location of `provisioning.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "datalab", "provisioning")
        .map(|dirs| dirs.config_dir().join("provisioning.toml"))
}

/// Provider settings tables; only the active provider's table is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub aws: AwsCloudSettings,
    #[serde(default)]
    pub azure: AzureCloudSettings,
    #[serde(default)]
    pub gcp: GcpCloudSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// How often watched directories are scanned.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Time allowed for a response file when the request sets none.
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// After this long an unclaimed response file is no longer reported.
    #[serde(with = "humantime_serde")]
    pub unmatched_grace: Duration,
    pub delete_processed_files: bool,
    /// Wake the scanner on filesystem events in addition to polling.
    pub use_fs_events: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            default_timeout: Duration::from_secs(30 * 60),
            unmatched_grace: Duration::from_secs(10 * 60),
            delete_processed_files: true,
            use_fs_events: true,
        }
    }
}

impl From<&ListenerConfig> for ListenerSettings {
    fn from(config: &ListenerConfig) -> Self {
        ListenerSettings {
            poll_interval: config.poll_interval,
            settle_time: config.poll_interval,
            unmatched_grace: config.unmatched_grace,
            delete_processed_files: config.delete_processed_files,
            use_fs_events: config.use_fs_events,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Replace docker execution with synthetic response files.
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub response_delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            response_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub key_directory: PathBuf,
    pub response_directory: PathBuf,
    pub docker_log_directory: PathBuf,
    /// Key file name handed to containers as `conf_key_name`.
    pub admin_key: String,
    /// Image name prefix; `edge` becomes `<prefix>-edge:latest`.
    pub image_prefix: String,
    pub shell: String,
    pub cloud_provider: CloudProvider,
    #[serde(flatten)]
    pub cloud: CloudConfig,
    pub self_service_url: String,
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    pub listener: ListenerConfig,
    pub mock: MockConfig,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            key_directory: PathBuf::from("/opt/datalab/keys"),
            response_directory: PathBuf::from("/opt/datalab/tmp/result"),
            docker_log_directory: PathBuf::from("/var/opt/datalab/log"),
            admin_key: "KEYNAME".to_string(),
            image_prefix: "docker.datalab".to_string(),
            shell: "bash".to_string(),
            cloud_provider: CloudProvider::default(),
            cloud: CloudConfig::default(),
            self_service_url: "https://localhost:8443".to_string(),
            http_timeout: Duration::from_secs(30),
            listener: ListenerConfig::default(),
            mock: MockConfig::default(),
        }
    }
}

impl ProvisioningConfig {
    /// Apply `DATALAB_*` overrides from the process environment.
    pub fn merge_env_vars(&mut self) -> Result<(), ConfigError> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DATALAB_RESPONSE_DIR") {
            self.response_directory = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DATALAB_KEY_DIR") {
            self.key_directory = PathBuf::from(dir);
        }
        if let Some(url) = lookup("DATALAB_SELF_SERVICE_URL") {
            self.self_service_url = url;
        }
        if let Some(provider) = lookup("DATALAB_CLOUD_PROVIDER") {
            self.cloud_provider = provider.parse().map_err(|message| ConfigError::Invalid {
                key: "DATALAB_CLOUD_PROVIDER",
                message,
            })?;
        }
        if let Some(mock) = lookup("DATALAB_MOCK") {
            self.mock.enabled = mock.parse().map_err(|_| ConfigError::Invalid {
                key: "DATALAB_MOCK",
                message: format!("expected true or false, got {mock}"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "listener.poll_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.listener.default_timeout < self.listener.poll_interval {
            return Err(ConfigError::Invalid {
                key: "listener.default_timeout",
                message: "must not be shorter than listener.poll_interval".to_string(),
            });
        }
        if let Err(e) = reqwest::Url::parse(&self.self_service_url) {
            return Err(ConfigError::Invalid {
                key: "self_service_url",
                message: e.to_string(),
            });
        }
        if self.shell.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "shell",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Full image reference for an image type or an already complete name.
    pub fn image_name(&self, image: &str) -> String {
        if image.contains(':') || image.starts_with(&format!("{}-", self.image_prefix)) {
            image.to_string()
        } else {
            format!("{}-{}:latest", self.image_prefix, image)
        }
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings::from(&self.listener)
    }

    pub fn response_directory(&self) -> &Path {
        &self.response_directory
    }
}

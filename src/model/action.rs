//! Docker actions and resource types understood by provisioning images.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation passed to a provisioning container via `--action`.
///
/// The action decides which callback handler consumes the response file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockerAction {
    Create,
    Start,
    Stop,
    Terminate,
    Status,
    LibList,
    LibInstall,
    GitCreds,
    CreateImage,
    ReconfigureSpark,
    CheckInactivity,
    ReuploadKey,
    Describe,
    Run,
}

impl DockerAction {
    pub const ALL: [DockerAction; 14] = [
        DockerAction::Create,
        DockerAction::Start,
        DockerAction::Stop,
        DockerAction::Terminate,
        DockerAction::Status,
        DockerAction::LibList,
        DockerAction::LibInstall,
        DockerAction::GitCreds,
        DockerAction::CreateImage,
        DockerAction::ReconfigureSpark,
        DockerAction::CheckInactivity,
        DockerAction::ReuploadKey,
        DockerAction::Describe,
        DockerAction::Run,
    ];

    /// Entrypoint action string understood by the container scripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            DockerAction::Create => "create",
            DockerAction::Start => "start",
            DockerAction::Stop => "stop",
            DockerAction::Terminate => "terminate",
            DockerAction::Status => "status",
            DockerAction::LibList => "lib_list",
            DockerAction::LibInstall => "lib_install",
            DockerAction::GitCreds => "git_creds",
            DockerAction::CreateImage => "create_image",
            DockerAction::ReconfigureSpark => "reconfigure_spark",
            DockerAction::CheckInactivity => "check_inactivity",
            DockerAction::ReuploadKey => "reupload_key",
            DockerAction::Describe => "describe",
            DockerAction::Run => "run",
        }
    }
}

impl fmt::Display for DockerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DockerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| format!("Unknown docker action: {s}"))
    }
}

/// Kind of infrastructure a request provisions.
///
/// The string form is the `conf_resource` value handed to the container and
/// the prefix of the response file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "edge")]
    Edge,
    #[serde(rename = "notebook", alias = "exploratory")]
    Exploratory,
    #[serde(rename = "dataengine", alias = "computational")]
    Computational,
    #[serde(rename = "dataengine-service")]
    ComputationalService,
    #[serde(rename = "backup")]
    Backup,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Edge => "edge",
            ResourceType::Exploratory => "notebook",
            ResourceType::Computational => "dataengine",
            ResourceType::ComputationalService => "dataengine-service",
            ResourceType::Backup => "backup",
        }
    }

    pub fn is_computational(&self) -> bool {
        matches!(
            self,
            ResourceType::Computational | ResourceType::ComputationalService
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edge" => Ok(ResourceType::Edge),
            "notebook" | "exploratory" => Ok(ResourceType::Exploratory),
            "dataengine" | "computational" => Ok(ResourceType::Computational),
            "dataengine-service" => Ok(ResourceType::ComputationalService),
            "backup" => Ok(ResourceType::Backup),
            other => Err(format!("Unknown resource type: {other}")),
        }
    }
}

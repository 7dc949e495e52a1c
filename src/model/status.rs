use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::action::DockerAction;

/// Lifecycle status of a provisioned resource as tracked by self-service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserInstanceStatus {
    Creating,
    Created,
    Starting,
    Configuring,
    Running,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
    Failed,
    CreatingImage,
    Reconfiguring,
    ReuploadingKey,
}

impl UserInstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserInstanceStatus::Creating => "creating",
            UserInstanceStatus::Created => "created",
            UserInstanceStatus::Starting => "starting",
            UserInstanceStatus::Configuring => "configuring",
            UserInstanceStatus::Running => "running",
            UserInstanceStatus::Stopping => "stopping",
            UserInstanceStatus::Stopped => "stopped",
            UserInstanceStatus::Terminating => "terminating",
            UserInstanceStatus::Terminated => "terminated",
            UserInstanceStatus::Failed => "failed",
            UserInstanceStatus::CreatingImage => "creating_image",
            UserInstanceStatus::Reconfiguring => "reconfiguring",
            UserInstanceStatus::ReuploadingKey => "reuploading_key",
        }
    }

    /// Status reported when a container finishes `action` with `"status": "ok"`.
    pub fn on_success(action: DockerAction) -> Self {
        match action {
            DockerAction::Create
            | DockerAction::Start
            | DockerAction::GitCreds
            | DockerAction::ReconfigureSpark
            | DockerAction::ReuploadKey
            | DockerAction::LibInstall
            | DockerAction::LibList
            | DockerAction::CheckInactivity
            | DockerAction::Status
            | DockerAction::Describe
            | DockerAction::Run => UserInstanceStatus::Running,
            DockerAction::Stop => UserInstanceStatus::Stopped,
            DockerAction::Terminate => UserInstanceStatus::Terminated,
            DockerAction::CreateImage => UserInstanceStatus::Created,
        }
    }
}

impl fmt::Display for UserInstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserInstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let status = match normalized.as_str() {
            "creating" => UserInstanceStatus::Creating,
            "created" => UserInstanceStatus::Created,
            "starting" => UserInstanceStatus::Starting,
            "configuring" => UserInstanceStatus::Configuring,
            "running" => UserInstanceStatus::Running,
            "stopping" => UserInstanceStatus::Stopping,
            "stopped" => UserInstanceStatus::Stopped,
            "terminating" => UserInstanceStatus::Terminating,
            "terminated" => UserInstanceStatus::Terminated,
            "failed" => UserInstanceStatus::Failed,
            "creating_image" => UserInstanceStatus::CreatingImage,
            "reconfiguring" => UserInstanceStatus::Reconfiguring,
            "reuploading_key" => UserInstanceStatus::ReuploadingKey,
            _ => return Err(format!("Unknown instance status: {s}")),
        };
        Ok(status)
    }
}

/// Per-library installation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibStatus {
    Installing,
    Installed,
    Failed,
    InvalidVersion,
    InvalidName,
}

impl FromStr for LibStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "installing" => Ok(LibStatus::Installing),
            "installed" | "ok" => Ok(LibStatus::Installed),
            "failed" | "err" | "error" => Ok(LibStatus::Failed),
            "invalid_version" => Ok(LibStatus::InvalidVersion),
            "invalid_name" => Ok(LibStatus::InvalidName),
            other => Err(format!("Unknown library status: {other}")),
        }
    }
}

//! Bodies POSTed to self-service. Every one flattens a [`StatusBase`], so
//! each carries `request_id` and `user`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::LibStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBase {
    pub request_id: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub uptime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploratoryStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    pub exploratory_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploratory_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploratory_url: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationalStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    pub exploratory_name: String,
    pub computational_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computational_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computational_url: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_info: Option<Value>,
}

/// Status of a resource with nothing beyond the base fields: git
/// credentials, backups, key re-upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    pub exploratory_name: String,
    pub image_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibInstallEntry {
    pub group: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: LibStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibInstallStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    pub exploratory_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computational_name: Option<String>,
    pub libs: Vec<LibInstallEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibListEntry {
    pub group: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibListStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    pub exploratory_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computational_name: Option<String>,
    pub libs: Vec<LibListEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInactivityStatusDto {
    #[serde(flatten)]
    pub base: StatusBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploratory_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computational_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

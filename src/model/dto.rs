//! Request payloads piped into provisioning containers as JSON.

use serde::{Deserialize, Serialize};

use super::cloud::CloudSettings;

/// Common envelope for every request sent to a container.
///
/// `cloud_settings` is replaced by the command builder with the settings of
/// the active provider, so callers normally leave it empty.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceBaseDto<T> {
    #[serde(rename = "edge_user_name")]
    pub user: String,
    #[serde(rename = "project_name", skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(rename = "endpoint_name", skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(
        rename = "conf_service_base_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_base_name: Option<String>,
    #[serde(flatten)]
    pub cloud_settings: Option<CloudSettings>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> ResourceBaseDto<T> {
    pub fn new(user: impl Into<String>, body: T) -> Self {
        Self {
            user: user.into(),
            project: None,
            endpoint: None,
            service_base_name: None,
            cloud_settings: None,
            body,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_service_base_name(mut self, name: impl Into<String>) -> Self {
        self.service_base_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExploratoryBody {
    pub exploratory_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_instance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub git_creds: Vec<GitCredential>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ComputationalBody {
    pub exploratory_name: String,
    pub computational_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_instance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataengine_instance_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataengine_instance_shape: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRef {
    pub group: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LibInstallBody {
    pub exploratory_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computational_name: Option<String>,
    pub libs: Vec<LibraryRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImageBody {
    pub exploratory_name: String,
    pub notebook_image_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_instance_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCredential {
    pub hostname: String,
    pub username: String,
    pub email: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GitCredsBody {
    pub exploratory_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_instance_name: Option<String>,
    pub git_creds: Vec<GitCredential>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cloud::{CloudSettings, GcpCloudSettings};

    #[test]
    fn test_envelope_flattens_body_and_settings() {
        let mut dto = ResourceBaseDto::new(
            "bob",
            ComputationalBody {
                exploratory_name: "nb1".to_string(),
                computational_name: "spark".to_string(),
                ..Default::default()
            },
        )
        .with_project("proj");
        dto.cloud_settings = Some(CloudSettings::Gcp(GcpCloudSettings {
            gcp_region: Some("europe-west1".to_string()),
            ..Default::default()
        }));

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["edge_user_name"], "bob");
        assert_eq!(json["project_name"], "proj");
        assert_eq!(json["computational_name"], "spark");
        assert_eq!(json["gcp_region"], "europe-west1");
        assert!(json.get("endpoint_name").is_none());
    }
}

//! Cloud provider selection and the provider specific settings merged into
//! every request sent to a provisioning container.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    #[default]
    Aws,
    Azure,
    Gcp,
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Gcp => "gcp",
        };
        f.write_str(name)
    }
}

impl FromStr for CloudProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(CloudProvider::Aws),
            "azure" => Ok(CloudProvider::Azure),
            "gcp" => Ok(CloudProvider::Gcp),
            other => Err(format!("Unknown cloud provider: {other}")),
        }
    }
}

/// LDAP connection settings shared by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LdapSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_ou: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_service_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_service_password: Option<String>,
}

/// Certificate authority settings for step-ca issued certificates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CertificateSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_stepcerts_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_stepcerts_root_ca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_stepcerts_kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_stepcerts_kid_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_stepcerts_ca_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AwsCloudSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_iam_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_notebook_vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_notebook_subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_security_groups_ids: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_tag_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_os_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_key_name: Option<String>,
    #[serde(flatten)]
    pub ldap: LdapSettings,
    #[serde(flatten)]
    pub certificates: CertificateSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AzureCloudSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_iam_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_resource_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_vpc_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_subnet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_security_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_datalake_enable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_os_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_key_name: Option<String>,
    #[serde(flatten)]
    pub ldap: LdapSettings,
    #[serde(flatten)]
    pub certificates: CertificateSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GcpCloudSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_iam_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_vpc_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_subnet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_os_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_key_name: Option<String>,
    #[serde(flatten)]
    pub ldap: LdapSettings,
    #[serde(flatten)]
    pub certificates: CertificateSettings,
}

/// Provider settings as they appear inside a serialized request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CloudSettings {
    Aws(AwsCloudSettings),
    Azure(AzureCloudSettings),
    Gcp(GcpCloudSettings),
}

impl CloudSettings {
    pub fn provider(&self) -> CloudProvider {
        match self {
            CloudSettings::Aws(_) => CloudProvider::Aws,
            CloudSettings::Azure(_) => CloudProvider::Azure,
            CloudSettings::Gcp(_) => CloudProvider::Gcp,
        }
    }

    /// Stamp the requesting user as the provider IAM user.
    pub fn with_iam_user(mut self, user: &str) -> Self {
        let user = Some(user.to_string());
        match &mut self {
            CloudSettings::Aws(s) => s.aws_iam_user = user,
            CloudSettings::Azure(s) => s.azure_iam_user = user,
            CloudSettings::Gcp(s) => s.gcp_iam_user = user,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_settings_flatten_ldap() {
        let settings = CloudSettings::Aws(AwsCloudSettings {
            aws_region: Some("us-west-2".to_string()),
            ldap: LdapSettings {
                ldap_hostname: Some("ldap.local".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .with_iam_user("alice");

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["aws_region"], "us-west-2");
        assert_eq!(json["ldap_hostname"], "ldap.local");
        assert_eq!(json["aws_iam_user"], "alice");
        assert!(json.get("aws_vpc_id").is_none());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("GCP".parse::<CloudProvider>().unwrap(), CloudProvider::Gcp);
        assert!("openstack".parse::<CloudProvider>().is_err());
        assert_eq!(
            CloudSettings::Azure(AzureCloudSettings::default()).provider(),
            CloudProvider::Azure
        );
    }
}

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::docker::CmdCommand;
use super::error::BuildError;
use super::redact::redact_command;
use crate::config::CloudConfig;
use crate::model::{CloudProvider, CloudSettings, ResourceBaseDto};

/// Turns a typed command plus request DTO into the shell pipeline that feeds
/// the request JSON to the container on stdin:
///
/// ```text
/// echo -e '<json>' | docker run ... <image> --action <action>
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    provider: CloudProvider,
    cloud: CloudConfig,
}

impl CommandBuilder {
    pub fn new(provider: CloudProvider, cloud: CloudConfig) -> Self {
        Self { provider, cloud }
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    /// Settings of the active provider, stamped with the requesting user.
    pub fn cloud_settings(&self, user: &str) -> CloudSettings {
        let settings = match self.provider {
            CloudProvider::Aws => CloudSettings::Aws(self.cloud.aws.clone()),
            CloudProvider::Azure => CloudSettings::Azure(self.cloud.azure.clone()),
            CloudProvider::Gcp => CloudSettings::Gcp(self.cloud.gcp.clone()),
        };
        settings.with_iam_user(user)
    }

    pub fn build_command<C, T>(
        &self,
        command: &C,
        dto: Option<&ResourceBaseDto<T>>,
    ) -> Result<String, BuildError>
    where
        C: CmdCommand + ?Sized,
        T: Serialize,
    {
        let mut pipeline = String::new();

        if let Some(dto) = dto {
            let payload = self.request_json(dto)?;
            pipeline.push_str("echo -e '");
            pipeline.push_str(&payload.replace('\'', r"'\''"));
            pipeline.push_str("' | ");
        }
        pipeline.push_str(&command.to_cmd()?);

        info!("Built provisioning command: {}", redact_command(&pipeline));
        Ok(pipeline)
    }

    /// Serialize `dto` and overlay the active provider settings on it.
    pub fn request_json<T: Serialize>(&self, dto: &ResourceBaseDto<T>) -> Result<String, BuildError> {
        let mut json = serde_json::to_value(dto)?;
        let settings = serde_json::to_value(self.cloud_settings(&dto.user))?;

        let Value::Object(target) = &mut json else {
            return Err(BuildError::NotAnObject(json_kind(&json)));
        };
        if let Value::Object(settings) = settings {
            debug!(
                "Applying {} {} settings to request for {}",
                settings.len(),
                self.provider,
                dto.user
            );
            target.extend(settings);
        }

        Ok(serde_json::to_string(&json)?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::docker::{PythonBackupCommand, RunDockerCommand};
    use crate::model::{
        AwsCloudSettings, AzureCloudSettings, DockerAction, GitCredential, GitCredsBody,
        LdapSettings, ResourceType,
    };
    use std::collections::HashMap;

    fn cloud() -> CloudConfig {
        CloudConfig {
            aws: AwsCloudSettings {
                aws_region: Some("us-east-1".to_string()),
                aws_vpc_id: Some("vpc-1".to_string()),
                ldap: LdapSettings {
                    ldap_service_password: Some("ldap-pw".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            azure: AzureCloudSettings {
                azure_region: Some("westeurope".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn docker() -> RunDockerCommand {
        RunDockerCommand::new()
            .with_interactive()
            .with_conf_resource(ResourceType::Exploratory)
            .with_action_for(DockerAction::GitCreds, "docker.datalab-jupyter:latest")
    }

    #[test]
    fn test_build_command_pipes_json_into_docker() {
        let builder = CommandBuilder::new(CloudProvider::Aws, cloud());
        let dto = ResourceBaseDto::new("alice", serde_json::json!({"exploratory_name": "nb"}));

        let cmd = builder.build_command(&docker(), Some(&dto)).unwrap();
        assert!(cmd.starts_with("echo -e '{"));
        assert!(cmd.ends_with(
            "' | docker run -i -e \"conf_resource=notebook\" docker.datalab-jupyter:latest --action git_creds"
        ));

        let json: Value = serde_json::from_str(&shell_words::split(&cmd).unwrap()[2]).unwrap();
        assert_eq!(json["edge_user_name"], "alice");
        assert_eq!(json["exploratory_name"], "nb");
        assert_eq!(json["aws_region"], "us-east-1");
        assert_eq!(json["aws_iam_user"], "alice");
        assert!(json.get("azure_region").is_none());
    }

    #[test]
    fn test_active_provider_selects_settings() {
        let builder = CommandBuilder::new(CloudProvider::Azure, cloud());
        let dto = ResourceBaseDto::new("bob", serde_json::json!({}));
        let json: Value = serde_json::from_str(&builder.request_json(&dto).unwrap()).unwrap();
        assert_eq!(json["azure_region"], "westeurope");
        assert_eq!(json["azure_iam_user"], "bob");
        assert!(json.get("aws_region").is_none());
    }

    #[test]
    fn test_single_quotes_survive_shell_splitting() {
        let builder = CommandBuilder::new(CloudProvider::Gcp, CloudConfig::default());
        let dto = ResourceBaseDto::new(
            "carol",
            GitCredsBody {
                exploratory_name: "it's mine".to_string(),
                notebook_instance_name: None,
                git_creds: vec![GitCredential {
                    hostname: "github.com".to_string(),
                    username: "Carol".to_string(),
                    email: "carol@example.com".to_string(),
                    login: "carol".to_string(),
                    password: "pa'ss".to_string(),
                }],
            },
        );

        let cmd = builder.build_command(&docker(), Some(&dto)).unwrap();
        let tokens = shell_words::split(&cmd).unwrap();
        let json: Value = serde_json::from_str(&tokens[2]).unwrap();
        assert_eq!(json["exploratory_name"], "it's mine");
        assert_eq!(json["git_creds"][0]["password"], "pa'ss");
        assert_eq!(tokens[3], "|");
    }

    #[test]
    fn test_unserializable_dto_is_a_serialization_error() {
        let builder = CommandBuilder::new(CloudProvider::Aws, cloud());
        let mut body: HashMap<(u8, u8), String> = HashMap::new();
        body.insert((1, 2), "tuple keys are not JSON".to_string());
        let dto = ResourceBaseDto::new("alice", body);

        let result = builder.build_command(&docker(), Some(&dto));
        assert!(matches!(result, Err(BuildError::Serialization(_))));
    }

    #[test]
    fn test_command_without_dto_is_rendered_as_is() {
        let builder = CommandBuilder::new(CloudProvider::Aws, cloud());
        let backup = PythonBackupCommand::new("backup.py").with_request_id("r-9");
        let cmd = builder
            .build_command::<_, Value>(&backup, None)
            .unwrap();
        assert_eq!(cmd, "python backup.py --request_id r-9");
    }
}

//! Commands built for each cloud provider read back through the parser.

use serde_json::json;

use datalab_provisioning::command::{
    redact_command, CommandBuilder, CommandParser, RunDockerCommand,
};
use datalab_provisioning::config::CloudConfig;
use datalab_provisioning::model::{
    AwsCloudSettings, AzureCloudSettings, CloudProvider, DockerAction, ExploratoryBody,
    GcpCloudSettings, GitCredential, GitCredsBody, ResourceBaseDto, ResourceType,
};

fn cloud() -> CloudConfig {
    CloudConfig {
        aws: AwsCloudSettings {
            aws_region: Some("us-west-2".to_string()),
            ..Default::default()
        },
        azure: AzureCloudSettings {
            azure_region: Some("westeurope".to_string()),
            ..Default::default()
        },
        gcp: GcpCloudSettings {
            gcp_region: Some("us-central1".to_string()),
            ..Default::default()
        },
    }
}

fn run_command(action: DockerAction, resource: ResourceType, image: &str) -> RunDockerCommand {
    RunDockerCommand::new()
        .with_interactive()
        .with_remove()
        .with_name("alice-request")
        .with_volume_for_root_keys("/opt/datalab/keys")
        .with_volume_for_response("/opt/datalab/tmp/result")
        .with_conf_resource(resource)
        .with_request_id("4f1c-77")
        .with_conf_key_name("KEYNAME")
        .with_action_for(action, image)
}

#[test]
fn test_round_trip_for_every_provider() {
    let regions = [
        (CloudProvider::Aws, "aws_region", "us-west-2"),
        (CloudProvider::Azure, "azure_region", "westeurope"),
        (CloudProvider::Gcp, "gcp_region", "us-central1"),
    ];

    for (provider, region_key, region) in regions {
        let builder = CommandBuilder::new(provider, cloud());
        let dto = ResourceBaseDto::new(
            "alice",
            ExploratoryBody {
                exploratory_name: "nb-it's-mine".to_string(),
                notebook_instance_type: Some("m5.xlarge".to_string()),
                ..Default::default()
            },
        )
        .with_project("research");

        let command = builder
            .build_command(
                &run_command(
                    DockerAction::Create,
                    ResourceType::Exploratory,
                    "docker.datalab-jupyter:latest",
                ),
                Some(&dto),
            )
            .unwrap();
        assert!(command.starts_with("echo -e '"));

        let parsed = CommandParser::parse(&command, "unused").unwrap();
        assert_eq!(parsed.docker_action(), Some(DockerAction::Create));
        assert_eq!(parsed.resource(), Some(ResourceType::Exploratory));
        assert_eq!(parsed.image_type.as_deref(), Some("jupyter"));
        assert_eq!(parsed.request_id, "4f1c-77");
        assert_eq!(parsed.response_host_dir(), Some("/opt/datalab/tmp/result"));
        assert_eq!(parsed.json_str("exploratory_name"), Some("nb-it's-mine"));
        assert_eq!(parsed.json_str("edge_user_name"), Some("alice"));
        assert_eq!(parsed.json_str("project_name"), Some("research"));
        assert_eq!(parsed.json_str("notebook_instance_type"), Some("m5.xlarge"));
        assert_eq!(parsed.json_str(region_key), Some(region), "{provider}");
    }
}

#[test]
fn test_derived_ids_are_stable_per_request() {
    let builder = CommandBuilder::new(CloudProvider::Aws, cloud());
    let dto = ResourceBaseDto::new("bob", json!({"computational_name": "spark"}));
    let command = builder
        .build_command(
            &run_command(
                DockerAction::Start,
                ResourceType::Computational,
                "docker.datalab-dataengine:latest",
            ),
            Some(&dto),
        )
        .unwrap();

    let first = CommandParser::parse(&command, "x").unwrap();
    let second = CommandParser::parse(&command, "y").unwrap();
    assert_eq!(first.instance_id, second.instance_id);
    assert_eq!(first.cluster_id, second.cluster_id);
    assert!(first.instance_id.starts_with("i-"));
    assert!(first.cluster_id.starts_with("j-"));
    assert!(first.notebook_id.starts_with("nb-"));
}

#[test]
fn test_credentials_are_masked_in_redacted_command() {
    let builder = CommandBuilder::new(CloudProvider::Aws, cloud());
    let dto = ResourceBaseDto::new(
        "alice",
        GitCredsBody {
            exploratory_name: "nb".to_string(),
            git_creds: vec![GitCredential {
                hostname: "github.com".to_string(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                login: "alice".to_string(),
                password: "hunter2".to_string(),
            }],
            ..Default::default()
        },
    );
    let command = builder
        .build_command(
            &run_command(
                DockerAction::GitCreds,
                ResourceType::Exploratory,
                "docker.datalab-jupyter:latest",
            ),
            Some(&dto),
        )
        .unwrap();

    assert!(command.contains("hunter2"));
    let redacted = redact_command(&command);
    assert!(!redacted.contains("hunter2"));
    assert!(redacted.contains("--action git_creds"));
}

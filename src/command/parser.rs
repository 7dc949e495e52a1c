//! Decomposition of provisioning command lines, used by the mock executor to
//! fabricate container responses.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::docker::RESPONSE_PATH;
use super::error::ParseError;
use crate::model::{DockerAction, ResourceType};

static IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^docker\.[A-Za-z0-9_]+-([A-Za-z0-9_.-]+?)(?::[A-Za-z0-9_.-]+)?$")
        .expect("Invalid regex pattern")
});

/// `-v host:container[:mode]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeMount {
    pub host: String,
    pub container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedCommand {
    pub command: String,
    pub request_id: String,
    pub program: Option<String>,
    pub action: Option<String>,
    pub image: Option<String>,
    pub image_type: Option<String>,
    pub resource_type: Option<String>,
    pub name: Option<String>,
    pub result_path: Option<String>,
    pub volumes: Vec<VolumeMount>,
    pub variables: BTreeMap<String, String>,
    pub json: Option<Value>,
    pub other_args: Vec<String>,
    pub instance_id: String,
    pub cluster_id: String,
    pub notebook_id: String,
}

impl ParsedCommand {
    pub fn docker_action(&self) -> Option<DockerAction> {
        self.action.as_deref().and_then(|a| a.parse().ok())
    }

    pub fn resource(&self) -> Option<ResourceType> {
        self.resource_type.as_deref().and_then(|r| r.parse().ok())
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Host directory mounted at the container response path.
    pub fn response_host_dir(&self) -> Option<&str> {
        self.volumes
            .iter()
            .find(|v| v.container == RESPONSE_PATH)
            .map(|v| v.host.as_str())
    }

    /// String field of the piped JSON payload.
    pub fn json_str(&self, field: &str) -> Option<&str> {
        self.json.as_ref()?.get(field)?.as_str()
    }
}

pub struct CommandParser;

impl CommandParser {
    /// Tokenize `command` with shell quoting rules and pick out the pieces a
    /// provisioning container would see.
    ///
    /// `request_id` is used unless the command carries its own `request_id`
    /// environment variable.
    pub fn parse(command: &str, request_id: &str) -> Result<ParsedCommand, ParseError> {
        let tokens = shell_words::split(command)?;
        if tokens.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut parsed = ParsedCommand {
            command: command.to_string(),
            ..Default::default()
        };
        let mut iter = tokens.into_iter().peekable();

        while let Some(token) = iter.next() {
            match token.as_str() {
                "echo" => {
                    while iter.peek().is_some_and(|t| t == "-e" || t == "-n") {
                        iter.next();
                    }
                    let payload = iter
                        .next()
                        .ok_or_else(|| ParseError::MissingValue("echo".to_string()))?;
                    let json = serde_json::from_str(&payload).map_err(ParseError::Payload)?;
                    parsed.json = Some(json);
                }
                "|" => {}
                "docker" => {
                    parsed.program = Some("docker".to_string());
                    if iter.peek().is_some_and(|t| t == "run") {
                        iter.next();
                    }
                }
                "python" | "python3" => {
                    parsed.program = Some(token.clone());
                    if let Some(script) = iter.next() {
                        parsed.other_args.push(script);
                    }
                }
                "-v" | "--volume" => {
                    let value = Self::value_of(&token, &mut iter)?;
                    parsed.volumes.push(Self::volume(&value)?);
                }
                "-e" | "--env" => {
                    let value = Self::value_of(&token, &mut iter)?;
                    let (key, val) = Self::pair(&token, &value, '=')?;
                    parsed.variables.insert(key, val);
                }
                "--name" => parsed.name = Some(Self::value_of(&token, &mut iter)?),
                "--action" => parsed.action = Some(Self::value_of(&token, &mut iter)?),
                "--result_path" => parsed.result_path = Some(Self::value_of(&token, &mut iter)?),
                "--request_id" => {
                    let value = Self::value_of(&token, &mut iter)?;
                    parsed.variables.insert("request_id".to_string(), value);
                }
                "-a" | "--attach" => {
                    let value = Self::value_of(&token, &mut iter)?;
                    parsed.other_args.push(format!("{token} {value}"));
                }
                _ if token.starts_with('-') => parsed.other_args.push(token),
                _ if parsed.image.is_none() && parsed.program.as_deref() == Some("docker") => {
                    parsed.image_type = Self::image_type(&token);
                    parsed.image = Some(token);
                }
                _ => parsed.other_args.push(token),
            }
        }

        parsed.resource_type = parsed.variables.get("conf_resource").cloned();
        parsed.request_id = parsed
            .variables
            .get("request_id")
            .cloned()
            .unwrap_or_else(|| request_id.to_string());
        Self::derive_ids(&mut parsed);
        Ok(parsed)
    }

    fn value_of<I>(option: &str, iter: &mut I) -> Result<String, ParseError>
    where
        I: Iterator<Item = String>,
    {
        iter.next()
            .ok_or_else(|| ParseError::MissingValue(option.to_string()))
    }

    fn pair(option: &str, value: &str, separator: char) -> Result<(String, String), ParseError> {
        match value.split_once(separator) {
            Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
            _ => Err(ParseError::InvalidPair {
                option: option.to_string(),
                value: value.to_string(),
                expected: "KEY=VALUE",
            }),
        }
    }

    fn volume(value: &str) -> Result<VolumeMount, ParseError> {
        let parts: Vec<&str> = value.split(':').collect();
        match parts.as_slice() {
            [host, container] if !host.is_empty() && !container.is_empty() => Ok(VolumeMount {
                host: host.to_string(),
                container: container.to_string(),
                mode: None,
            }),
            [host, container, mode] if !host.is_empty() && !container.is_empty() => {
                Ok(VolumeMount {
                    host: host.to_string(),
                    container: container.to_string(),
                    mode: Some(mode.to_string()),
                })
            }
            _ => Err(ParseError::InvalidPair {
                option: "-v".to_string(),
                value: value.to_string(),
                expected: "host:container[:mode]",
            }),
        }
    }

    /// `docker.datalab-edge:latest` -> `edge`
    pub fn image_type(image: &str) -> Option<String> {
        IMAGE_PATTERN
            .captures(image)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Cloud-looking identifiers that are stable for a given request id.
    fn derive_ids(parsed: &mut ParsedCommand) {
        let digest = Sha256::digest(parsed.request_id.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        parsed.instance_id = format!("i-{}", &hex[..17]);
        parsed.cluster_id = format!("j-{}", hex[17..30].to_uppercase());
        parsed.notebook_id = format!("nb-{}", &hex[30..42]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_docker_run() {
        let parsed = CommandParser::parse(
            r#"docker run -i -e "conf_resource=edge" -e "request_id=abc" --action create docker.datalab-edge:latest"#,
            "ignored",
        )
        .unwrap();

        assert_eq!(parsed.action.as_deref(), Some("create"));
        assert_eq!(parsed.docker_action(), Some(DockerAction::Create));
        assert_eq!(parsed.resource_type.as_deref(), Some("edge"));
        assert_eq!(parsed.resource(), Some(ResourceType::Edge));
        assert_eq!(parsed.image_type.as_deref(), Some("edge"));
        assert_eq!(parsed.request_id, "abc");
        assert_eq!(parsed.other_args, vec!["-i"]);
    }

    #[test]
    fn test_parse_echo_payload_and_volumes() {
        let cmd = r#"echo -e '{"edge_user_name":"bob","note":"it'\''s"}' | docker run --rm -v /keys:/root/keys -v /handlers:/response:rw --name bob-edge docker.datalab-dataengine-service:latest --action stop --result_path /response/out.json"#;
        let parsed = CommandParser::parse(cmd, "req-1").unwrap();

        let json = parsed.json.as_ref().unwrap();
        assert_eq!(json["edge_user_name"], "bob");
        assert_eq!(json["note"], "it's");
        assert_eq!(parsed.json_str("edge_user_name"), Some("bob"));
        assert_eq!(parsed.volumes.len(), 2);
        assert_eq!(parsed.volumes[1].mode.as_deref(), Some("rw"));
        assert_eq!(parsed.response_host_dir(), Some("/handlers"));
        assert_eq!(parsed.name.as_deref(), Some("bob-edge"));
        assert_eq!(parsed.image_type.as_deref(), Some("dataengine-service"));
        assert_eq!(parsed.result_path.as_deref(), Some("/response/out.json"));
        assert_eq!(parsed.request_id, "req-1");
    }

    #[test]
    fn test_derived_ids_are_deterministic() {
        let a = CommandParser::parse("docker run img --action start", "r-1").unwrap();
        let b = CommandParser::parse("docker run img --action start", "r-1").unwrap();
        let c = CommandParser::parse("docker run img --action start", "r-2").unwrap();

        assert_eq!(a.instance_id, b.instance_id);
        assert_eq!(a.cluster_id, b.cluster_id);
        assert_ne!(a.instance_id, c.instance_id);
        assert!(a.instance_id.starts_with("i-"));
        assert_eq!(a.instance_id.len(), 19);
        assert!(a.cluster_id.starts_with("j-"));
        assert!(a.notebook_id.starts_with("nb-"));
    }

    #[test]
    fn test_parse_python_backup() {
        let parsed = CommandParser::parse(
            "python backup.py --db --request_id r-5 --result_path /response/backup.json",
            "other",
        )
        .unwrap();
        assert_eq!(parsed.program.as_deref(), Some("python"));
        assert_eq!(parsed.request_id, "r-5");
        assert_eq!(parsed.other_args, vec!["backup.py", "--db"]);
        assert!(parsed.image.is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(CommandParser::parse("   ", "r"), Err(ParseError::Empty)));
        assert!(matches!(
            CommandParser::parse("docker run -v onlyhost img", "r"),
            Err(ParseError::InvalidPair { .. })
        ));
        assert!(matches!(
            CommandParser::parse("docker run -e NOVALUE img", "r"),
            Err(ParseError::InvalidPair { .. })
        ));
        assert!(matches!(
            CommandParser::parse("docker run img --action", "r"),
            Err(ParseError::MissingValue(_))
        ));
        assert!(matches!(
            CommandParser::parse("echo -e '{broken' | docker run img", "r"),
            Err(ParseError::Payload(_))
        ));
        assert!(matches!(
            CommandParser::parse("echo 'unterminated", "r"),
            Err(ParseError::Tokenize(_))
        ));
    }

    #[test]
    fn test_image_type() {
        assert_eq!(
            CommandParser::image_type("docker.datalab-jupyter:latest").as_deref(),
            Some("jupyter")
        );
        assert_eq!(
            CommandParser::image_type("docker.datalab-edge").as_deref(),
            Some("edge")
        );
        assert_eq!(CommandParser::image_type("ubuntu:22.04"), None);
    }
}

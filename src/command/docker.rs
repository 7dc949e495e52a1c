//! Typed command lines for provisioning containers and backup scripts.

use std::path::Path;

use super::error::BuildError;
use crate::model::{DockerAction, ResourceType};

/// Container path the key directory is mounted at.
pub const ROOT_KEYS_PATH: &str = "/root/keys";
/// Container path the response directory is mounted at.
pub const RESPONSE_PATH: &str = "/response";
/// Container path prefix for per-resource log directories.
pub const LOGS_PATH: &str = "/logs";

/// Anything that renders to a single shell command line.
pub trait CmdCommand {
    fn to_cmd(&self) -> Result<String, BuildError>;
}

/// `docker run` invocation of a provisioning image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunDockerCommand {
    options: Vec<String>,
    image: Option<String>,
    action: Option<DockerAction>,
    result_path: Option<String>,
}

impl RunDockerCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interactive(mut self) -> Self {
        self.options.push("-i".to_string());
        self
    }

    pub fn with_remove(mut self) -> Self {
        self.options.push("--rm".to_string());
        self
    }

    pub fn with_detached(mut self) -> Self {
        self.options.push("-d".to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.options.push(format!("--name {}", shell_words::quote(name)));
        self
    }

    pub fn with_volume(mut self, host: impl AsRef<Path>, container: &str) -> Self {
        let mount = format!("{}:{}", host.as_ref().display(), container);
        self.options
            .push(format!("-v {}", shell_words::quote(&mount)));
        self
    }

    pub fn with_volume_for_root_keys(self, host: impl AsRef<Path>) -> Self {
        self.with_volume(host, ROOT_KEYS_PATH)
    }

    pub fn with_volume_for_response(self, host: impl AsRef<Path>) -> Self {
        self.with_volume(host, RESPONSE_PATH)
    }

    pub fn with_volume_for_logs(self, host: impl AsRef<Path>, resource: ResourceType) -> Self {
        let host = host.as_ref().join(resource.as_str());
        let container = format!("{LOGS_PATH}/{resource}");
        self.with_volume(host, &container)
    }

    /// `-e "KEY=VALUE"`, escaping the characters double quotes do not protect.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            if matches!(c, '"' | '\\' | '$' | '`') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        self.options.push(format!("-e \"{key}={escaped}\""));
        self
    }

    pub fn with_request_id(self, request_id: &str) -> Self {
        self.with_env("request_id", request_id)
    }

    pub fn with_conf_resource(self, resource: ResourceType) -> Self {
        self.with_env("conf_resource", resource.as_str())
    }

    pub fn with_conf_key_name(self, key_name: &str) -> Self {
        self.with_env("conf_key_name", key_name)
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }

    pub fn with_action(mut self, action: DockerAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Set image and action together, the usual way a command is finished.
    pub fn with_action_for(self, action: DockerAction, image: &str) -> Self {
        self.with_image(image).with_action(action)
    }

    pub fn with_result_path(mut self, path: &str) -> Self {
        self.result_path = Some(path.to_string());
        self
    }

    pub fn action(&self) -> Option<DockerAction> {
        self.action
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

impl CmdCommand for RunDockerCommand {
    fn to_cmd(&self) -> Result<String, BuildError> {
        let mut cmd = String::from("docker run");
        for option in &self.options {
            cmd.push(' ');
            cmd.push_str(option);
        }

        match (&self.image, self.action) {
            (Some(image), Some(action)) => {
                cmd.push(' ');
                cmd.push_str(&shell_words::quote(image));
                cmd.push_str(" --action ");
                cmd.push_str(action.as_str());
            }
            (None, None) => {}
            (Some(image), None) => {
                return Err(BuildError::Incomplete(format!(
                    "image {image} has no action"
                )))
            }
            (None, Some(action)) => {
                return Err(BuildError::Incomplete(format!(
                    "action {action} has no image"
                )))
            }
        }

        if let Some(path) = &self.result_path {
            cmd.push_str(" --result_path ");
            cmd.push_str(&shell_words::quote(path));
        }
        Ok(cmd)
    }
}

/// `python backup.py ...` run on the provisioning host itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonBackupCommand {
    script: String,
    configs: Vec<String>,
    keys: Vec<String>,
    jars: Vec<String>,
    database: bool,
    logs: bool,
    request_id: Option<String>,
    result_file: Option<String>,
}

impl PythonBackupCommand {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            configs: Vec::new(),
            keys: Vec::new(),
            jars: Vec::new(),
            database: false,
            logs: false,
            request_id: None,
            result_file: None,
        }
    }

    pub fn with_configs(mut self, configs: Vec<String>) -> Self {
        self.configs = configs;
        self
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_jars(mut self, jars: Vec<String>) -> Self {
        self.jars = jars;
        self
    }

    pub fn with_database_backup(mut self, enabled: bool) -> Self {
        self.database = enabled;
        self
    }

    pub fn with_logs_backup(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_result_file(mut self, path: &str) -> Self {
        self.result_file = Some(path.to_string());
        self
    }

    fn list_option(cmd: &mut String, flag: &str, values: &[String]) {
        if !values.is_empty() {
            cmd.push_str(&format!(" {flag} {}", shell_words::quote(&values.join(","))));
        }
    }
}

impl CmdCommand for PythonBackupCommand {
    fn to_cmd(&self) -> Result<String, BuildError> {
        let mut cmd = format!("python {}", shell_words::quote(&self.script));
        Self::list_option(&mut cmd, "--config", &self.configs);
        Self::list_option(&mut cmd, "--keys", &self.keys);
        Self::list_option(&mut cmd, "--jars", &self.jars);
        if self.database {
            cmd.push_str(" --db");
        }
        if self.logs {
            cmd.push_str(" --logs");
        }
        if let Some(id) = &self.request_id {
            cmd.push_str(&format!(" --request_id {}", shell_words::quote(id)));
        }
        if let Some(file) = &self.result_file {
            cmd.push_str(&format!(" --result_path {}", shell_words::quote(file)));
        }
        Ok(cmd)
    }
}

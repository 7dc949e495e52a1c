use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::table::ProcessTable;
use super::{CommandExecutor, ProcessId, ProcessInfo};
use crate::command::docker::RESPONSE_PATH;
use crate::command::{redact_command, CommandParser, ParsedCommand};
use crate::listener::response_file_name;
use crate::model::{DockerAction, ResourceType};
use crate::subprocess::{ExitStatus, ProcessError, ProcessOutput};

/// Executor that answers every command with a fabricated response file
/// instead of running it.
#[derive(Clone)]
pub struct MockCommandExecutor {
    delay: Duration,
    failures: Arc<HashMap<DockerAction, String>>,
    table: ProcessTable,
}

impl MockCommandExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failures: Arc::new(HashMap::new()),
            table: ProcessTable::new(),
        }
    }

    /// Answer `action` with `"status": "err"` and `message`.
    pub fn with_failure(mut self, action: DockerAction, message: &str) -> Self {
        Arc::make_mut(&mut self.failures).insert(action, message.to_string());
        self
    }

    async fn run_recorded(&self, id: &ProcessId, command: &str) -> Result<(), ProcessError> {
        let clock = Instant::now();
        let result = Self::respond(self.delay, &self.failures, &id.user, &id.request_id, command)
            .await
            .map(|path| ProcessOutput {
                status: ExitStatus::Success,
                stdout: format!("{}\n", path.display()),
                stderr: String::new(),
                duration: clock.elapsed(),
            });
        self.table.finish(id, &result);
        result.map(|_| ())
    }

    /// Parse `command`, wait out the delay and write the response file.
    /// Returns the path written.
    async fn respond(
        delay: Duration,
        failures: &HashMap<DockerAction, String>,
        user: &str,
        request_id: &str,
        command: &str,
    ) -> Result<PathBuf, ProcessError> {
        let parsed = CommandParser::parse(command, request_id).map_err(|e| {
            ProcessError::InternalError {
                message: format!("cannot interpret command: {e}"),
            }
        })?;
        let path = Self::response_path(&parsed, user)?;
        let body = Self::response_body(&parsed, user, failures);

        tokio::time::sleep(delay).await;
        write_atomically(&path, &body).await?;
        info!(
            "Wrote mock response for {} {:?} to {}",
            parsed.request_id,
            parsed.action,
            path.display()
        );
        Ok(path)
    }

    /// Host location of the response file the command would produce.
    fn response_path(parsed: &ParsedCommand, user: &str) -> Result<PathBuf, ProcessError> {
        let host_dir = parsed.response_host_dir().map(PathBuf::from);

        if let Some(result_path) = parsed.result_path.as_deref() {
            let inside_response = result_path
                .strip_prefix(RESPONSE_PATH)
                .and_then(|rest| rest.strip_prefix('/'));
            return match (inside_response, host_dir) {
                (Some(rest), Some(dir)) => Ok(dir.join(rest)),
                _ if Path::new(result_path).is_absolute() => Ok(PathBuf::from(result_path)),
                _ => Err(ProcessError::InternalError {
                    message: format!("cannot place result path {result_path}"),
                }),
            };
        }

        let dir = host_dir.ok_or_else(|| ProcessError::InternalError {
            message: format!("command mounts no {RESPONSE_PATH} directory"),
        })?;
        let prefix = parsed
            .resource_type
            .as_deref()
            .or(parsed.image_type.as_deref())
            .unwrap_or("response");
        Ok(dir.join(response_file_name(prefix, user, &parsed.request_id)))
    }

    fn response_body(
        parsed: &ParsedCommand,
        user: &str,
        failures: &HashMap<DockerAction, String>,
    ) -> Value {
        let action = parsed.docker_action();
        if let Some(message) = action.and_then(|a| failures.get(&a)) {
            return json!({
                "status": "err",
                "request_id": parsed.request_id,
                "response": {"result": {"error": message}},
            });
        }

        let log = format!(
            "/var/log/datalab/{}/{}.log",
            parsed.resource_type.as_deref().unwrap_or("mock"),
            parsed.request_id
        );
        json!({
            "status": "ok",
            "request_id": parsed.request_id,
            "response": {
                "result": Self::result(parsed, user, action),
                "log": log,
            },
        })
    }

    fn result(parsed: &ParsedCommand, user: &str, action: Option<DockerAction>) -> Value {
        let mut result = Map::new();
        let resource = if parsed.program.as_deref().is_some_and(|p| p.starts_with("python")) {
            Some(ResourceType::Backup)
        } else {
            parsed.resource()
        };
        let ip = mock_ip(&parsed.instance_id);
        let name = parsed
            .json_str("exploratory_name")
            .or(parsed.name.as_deref())
            .unwrap_or("resource");

        match action {
            Some(DockerAction::LibList) => {
                result.insert(
                    "libs".to_string(),
                    json!({
                        "pip3": {"numpy": "1.26.4", "pandas": "2.2.1"},
                        "os_pkg": {"git": "2.39.2"},
                    }),
                );
                return Value::Object(result);
            }
            Some(DockerAction::LibInstall) => {
                let libs: Vec<Value> = parsed
                    .json
                    .as_ref()
                    .and_then(|j| j.get("libs"))
                    .and_then(Value::as_array)
                    .map(|libs| {
                        libs.iter()
                            .map(|lib| {
                                let mut lib = lib.clone();
                                if let Value::Object(map) = &mut lib {
                                    map.insert("status".to_string(), json!("installed"));
                                }
                                lib
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                result.insert("libs".to_string(), Value::Array(libs));
                return Value::Object(result);
            }
            Some(DockerAction::CheckInactivity) => {
                result.insert("last_activity".to_string(), json!(Utc::now().to_rfc3339()));
                return Value::Object(result);
            }
            Some(DockerAction::CreateImage) => {
                let image = parsed.json_str("notebook_image_name").unwrap_or("image");
                result.insert("image_name".to_string(), json!(image));
                result.insert(
                    "full_image_name".to_string(),
                    json!(format!("{}-{}", user, image)),
                );
                return Value::Object(result);
            }
            _ => {}
        }

        match resource {
            Some(ResourceType::Edge) => {
                result.insert("hostname".to_string(), json!(format!("{user}-edge")));
                result.insert("ip".to_string(), json!(ip));
                result.insert("instance_id".to_string(), json!(parsed.instance_id));
                if let Some(key) = parsed.variable("conf_key_name") {
                    result.insert("key_name".to_string(), json!(key));
                }
            }
            Some(ResourceType::Exploratory) => {
                result.insert("hostname".to_string(), json!(format!("{user}-{name}")));
                result.insert("ip".to_string(), json!(ip));
                result.insert("instance_id".to_string(), json!(parsed.instance_id));
                result.insert("notebook_name".to_string(), json!(parsed.notebook_id));
                result.insert(
                    "exploratory_url".to_string(),
                    json!([{"description": "Notebook", "url": format!("http://{ip}:8888/{}/", parsed.notebook_id)}]),
                );
            }
            Some(ResourceType::Computational) => {
                result.insert("instance_id".to_string(), json!(parsed.instance_id));
                result.insert(
                    "computational_url".to_string(),
                    json!([{"description": "Spark Master", "url": format!("http://{ip}:8080/")}]),
                );
            }
            Some(ResourceType::ComputationalService) => {
                result.insert("cluster_id".to_string(), json!(parsed.cluster_id));
                result.insert("instance_id".to_string(), json!(parsed.instance_id));
                result.insert(
                    "computational_url".to_string(),
                    json!([{"description": "Cluster Manager", "url": format!("http://{ip}:8088/")}]),
                );
            }
            Some(ResourceType::Backup) => {
                result.insert(
                    "backup_file".to_string(),
                    json!(format!("/opt/datalab/tmp/backup/backup_{}.tar.gz", parsed.request_id)),
                );
            }
            None => {}
        }
        Value::Object(result)
    }
}

/// Stable private address derived from an instance id.
fn mock_ip(instance_id: &str) -> String {
    let octet = |range: std::ops::Range<usize>| {
        instance_id
            .get(range)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .unwrap_or(1)
    };
    format!("172.31.{}.{}", octet(2..4), octet(4..6).max(2))
}

/// Write to a dot-file next to `path`, then rename, so a watcher never sees
/// a half-written file under the final name.
async fn write_atomically(path: &Path, body: &Value) -> Result<(), ProcessError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("response.json");
    let tmp = dir.join(format!(".{file_name}.tmp"));
    let content = serde_json::to_vec_pretty(body).map_err(|e| ProcessError::InternalError {
        message: format!("cannot serialize mock response: {e}"),
    })?;

    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl CommandExecutor for MockCommandExecutor {
    async fn execute_sync(
        &self,
        user: &str,
        request_id: &str,
        command: &str,
    ) -> Result<ProcessInfo, ProcessError> {
        let id = ProcessId::new(user, request_id);
        let started = self.table.start(id.clone(), redact_command(command));
        let result = self.run_recorded(&id, command).await;
        let info = self.table.get(&id).unwrap_or(started);
        result.map(|_| info)
    }

    fn execute_async(
        &self,
        user: &str,
        request_id: &str,
        command: &str,
    ) -> Result<ProcessId, ProcessError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| ProcessError::InternalError {
                message: format!("no async runtime to run command on: {e}"),
            })?;

        let id = ProcessId::new(user, request_id);
        self.table.start(id.clone(), redact_command(command));
        debug!("Mock executing {} in background", id);

        let task = runtime.spawn({
            let this = self.clone();
            let id = id.clone();
            let command = command.to_string();
            async move {
                if let Err(e) = this.run_recorded(&id, &command).await {
                    error!("Mock command for {} failed: {}", id, e);
                }
            }
        });
        self.table.attach(&id, task.abort_handle());
        Ok(id)
    }

    fn processes(&self) -> &ProcessTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ProcessStatus;
    use tempfile::TempDir;

    fn command(dir: &Path, resource: &str, action: &str, image: &str) -> String {
        format!(
            r#"echo -e '{{"edge_user_name":"alice","exploratory_name":"nb1"}}' | docker run -i --rm -v {}:/response -e "conf_resource={resource}" -e "request_id=r-1" {image} --action {action}"#,
            dir.display()
        )
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_writes_response_for_notebook_create() {
        let dir = TempDir::new().unwrap();
        let executor = MockCommandExecutor::new(Duration::ZERO);

        let info = executor
            .execute_sync(
                "alice",
                "r-1",
                &command(dir.path(), "notebook", "create", "docker.datalab-jupyter:latest"),
            )
            .await
            .unwrap();
        assert_eq!(info.status, ProcessStatus::Completed { exit_code: 0 });

        let path = dir.path().join("notebook_alice_r-1.json");
        let body = read(&path);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["request_id"], "r-1");
        let result = &body["response"]["result"];
        assert!(result["instance_id"].as_str().unwrap().starts_with("i-"));
        assert!(result["notebook_name"].as_str().unwrap().starts_with("nb-"));
        assert_eq!(result["hostname"], "alice-nb1");
        assert!(std::fs::read_dir(dir.path())
            .unwrap()
            .all(|e| !e.unwrap().file_name().to_string_lossy().ends_with(".tmp")));
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let dir = TempDir::new().unwrap();
        let executor = MockCommandExecutor::new(Duration::ZERO)
            .with_failure(DockerAction::Stop, "instance is locked");

        executor
            .execute_sync(
                "alice",
                "r-1",
                &command(dir.path(), "edge", "stop", "docker.datalab-edge:latest"),
            )
            .await
            .unwrap();

        let body = read(&dir.path().join("edge_alice_r-1.json"));
        assert_eq!(body["status"], "err");
        assert_eq!(body["response"]["result"]["error"], "instance is locked");
    }

    #[tokio::test]
    async fn test_result_path_is_mapped_to_host_dir() {
        let dir = TempDir::new().unwrap();
        let executor = MockCommandExecutor::new(Duration::ZERO);
        let cmd = format!(
            "docker run -v {}:/response -e request_id=r-9 docker.datalab-dataengine-service:latest --action lib_list --result_path /response/libs_r-9.json",
            dir.path().display()
        );

        executor.execute_sync("bob", "r-9", &cmd).await.unwrap();
        let body = read(&dir.path().join("libs_r-9.json"));
        assert_eq!(body["response"]["result"]["libs"]["pip3"]["numpy"], "1.26.4");
    }

    #[tokio::test]
    async fn test_command_without_response_mount_fails() {
        let executor = MockCommandExecutor::new(Duration::ZERO);
        let err = executor
            .execute_sync("bob", "r-2", "docker run docker.datalab-edge:latest --action start")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::InternalError { .. }));
        let info = executor
            .processes()
            .get(&ProcessId::new("bob", "r-2"))
            .unwrap();
        assert!(matches!(info.status, ProcessStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_async_writes_after_delay() {
        let dir = TempDir::new().unwrap();
        let executor = MockCommandExecutor::new(Duration::from_millis(100));
        let id = executor
            .execute_async(
                "alice",
                "r-1",
                &command(dir.path(), "edge", "start", "docker.datalab-edge:latest"),
            )
            .unwrap();

        let path = dir.path().join("edge_alice_r-1.json");
        assert!(!path.exists());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(path.exists());
        assert_eq!(
            executor.processes().get(&id).unwrap().status,
            ProcessStatus::Completed { exit_code: 0 }
        );
    }

    #[test]
    fn test_mock_ip_is_stable() {
        assert_eq!(mock_ip("i-0a1b2c"), "172.31.10.27");
        assert_eq!(mock_ip("i-0a1b2c"), mock_ip("i-0a1b2c"));
        assert_eq!(mock_ip(""), "172.31.1.2");
    }
}

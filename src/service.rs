//! Provisioning service: builds the command for a request, registers for
//! its response file and starts the command in the background.
//!
//! Registration always happens before execution, so a container can never
//! write its response before somebody is waiting for it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::callback::{
    CallbackError, HandlerContext, HandlerRegistry, ResourceStatusHandler, SelfServiceClient,
    StatusCallback, StatusSink,
};
use crate::command::{BuildError, CommandBuilder, PythonBackupCommand, RunDockerCommand};
use crate::config::ProvisioningConfig;
use crate::error::{Error, Result};
use crate::executor::{
    CommandExecutor, MockCommandExecutor, ProcessId, ProcessTable, ShellCommandExecutor,
};
use crate::listener::{
    response_file_name, FileHandlerCallback, FolderListener, ListenerOutcome, RegistrationHandle,
    RegistrationState,
};
use crate::model::{DockerAction, LibraryRef, ResourceBaseDto, ResourceType};
use crate::subprocess::TokioProcessRunner;

/// One provisioning action as submitted by self-service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub action: DockerAction,
    pub resource: ResourceType,
    /// Image type (`jupyter`) or full image reference.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploratory_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computational_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<LibraryRef>,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    /// Extra fields passed through to the container request as-is.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub body: Map<String, Value>,
}

impl ProvisioningRequest {
    /// Request payload piped to the container.
    pub fn dto(&self) -> ResourceBaseDto<Map<String, Value>> {
        let mut body = self.body.clone();
        let mut set = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                body.entry(key.to_string()).or_insert(value);
            }
        };
        set(
            "exploratory_name",
            self.exploratory_name.clone().map(Value::String),
        );
        set(
            "computational_name",
            self.computational_name.clone().map(Value::String),
        );
        set(
            "notebook_image_name",
            self.image_name.clone().map(Value::String),
        );
        if !self.libs.is_empty() {
            set("libs", serde_json::to_value(&self.libs).ok());
        }

        let dto = ResourceBaseDto::new(self.user.clone(), body);
        match &self.project {
            Some(project) => dto.with_project(project.clone()),
            None => dto,
        }
    }

    fn handler_context(&self, request_id: &str) -> HandlerContext {
        HandlerContext {
            request_id: request_id.to_string(),
            user: self.user.clone(),
            project: self.project.clone(),
            action: self.action,
            resource: self.resource,
            exploratory_name: self.exploratory_name.clone(),
            computational_name: self.computational_name.clone(),
            image_name: self.image_name.clone(),
            libs: self.libs.clone(),
        }
    }
}

/// Backup of service configuration, keys, jars, database and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRequest {
    pub user: String,
    #[serde(default)]
    pub configs: Vec<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub jars: Vec<String>,
    #[serde(default)]
    pub database: bool,
    #[serde(default)]
    pub logs: bool,
}

/// An accepted request: what to wait on and what to cancel.
#[derive(Debug)]
pub struct Submission {
    pub request_id: String,
    pub process: ProcessId,
    pub handle: RegistrationHandle,
}

pub struct ProvisioningService {
    config: ProvisioningConfig,
    builder: CommandBuilder,
    listener: FolderListener,
    executor: Arc<dyn CommandExecutor>,
    handlers: HandlerRegistry,
    sink: Arc<dyn StatusSink>,
}

impl ProvisioningService {
    pub fn new(
        config: ProvisioningConfig,
        executor: Arc<dyn CommandExecutor>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let builder = CommandBuilder::new(config.cloud_provider, config.cloud.clone());
        let listener = FolderListener::new(config.listener_settings());
        Self {
            config,
            builder,
            listener,
            executor,
            handlers: HandlerRegistry::with_defaults(),
            sink,
        }
    }

    /// Service wired the way the configuration asks: mock or shell executor,
    /// HTTP status delivery to self-service.
    pub fn from_config(config: ProvisioningConfig) -> Result<Self> {
        let executor: Arc<dyn CommandExecutor> = if config.mock.enabled {
            info!("Mock execution enabled, commands will not be run");
            Arc::new(MockCommandExecutor::new(config.mock.response_delay))
        } else {
            Arc::new(ShellCommandExecutor::new(
                Arc::new(TokioProcessRunner),
                config.shell.clone(),
            ))
        };
        let sink = Arc::new(SelfServiceClient::new(
            &config.self_service_url,
            config.http_timeout,
        )?);
        Ok(Self::new(config, executor, sink))
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub fn listener(&self) -> &FolderListener {
        &self.listener
    }

    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    pub fn docker_command(&self, request: &ProvisioningRequest, request_id: &str) -> RunDockerCommand {
        RunDockerCommand::new()
            .with_interactive()
            .with_remove()
            .with_name(&container_name(request, request_id))
            .with_volume_for_root_keys(&self.config.key_directory)
            .with_volume_for_response(&self.config.response_directory)
            .with_volume_for_logs(&self.config.docker_log_directory, request.resource)
            .with_conf_resource(request.resource)
            .with_request_id(request_id)
            .with_conf_key_name(&self.config.admin_key)
            .with_action_for(request.action, &self.config.image_name(&request.image))
    }

    pub fn build_command(
        &self,
        request: &ProvisioningRequest,
        request_id: &str,
    ) -> std::result::Result<String, BuildError> {
        let docker = self.docker_command(request, request_id);
        self.builder.build_command(&docker, Some(&request.dto()))
    }

    /// Requests missing a name their status update needs are rejected
    /// before anything is registered or run.
    pub fn submit(&self, request: &ProvisioningRequest) -> Result<Submission> {
        let request_id = Uuid::new_v4().to_string();
        let handler = self.handlers.get(request.action)?;
        let context = request.handler_context(&request_id);
        handler.check(&context).map_err(|e| {
            Error::Validation(format!(
                "{} {} request rejected: {}",
                request.resource, request.action, e
            ))
        })?;

        let command = self.build_command(request, &request_id)?;
        let callback = StatusCallback::new(handler, context, Arc::clone(&self.sink));
        let timeout = request
            .timeout
            .unwrap_or(self.config.listener.default_timeout);

        self.dispatch(&request.user, request_id, &command, timeout, Arc::new(callback))
    }

    /// Run the backup script; its result file lands in the response directory.
    pub fn submit_backup(&self, request: &BackupRequest) -> Result<Submission> {
        let request_id = Uuid::new_v4().to_string();
        let result_file = self
            .config
            .response_directory
            .join(response_file_name(ResourceType::Backup.as_str(), &request.user, &request_id));

        let backup = PythonBackupCommand::new("backup.py")
            .with_configs(request.configs.clone())
            .with_keys(request.keys.clone())
            .with_jars(request.jars.clone())
            .with_database_backup(request.database)
            .with_logs_backup(request.logs)
            .with_request_id(&request_id)
            .with_result_file(&result_file.to_string_lossy());
        let command = self.builder.build_command::<_, Value>(&backup, None)?;

        let context = HandlerContext::new(
            &request_id,
            &request.user,
            DockerAction::Create,
            ResourceType::Backup,
        );
        let callback =
            StatusCallback::new(Arc::new(ResourceStatusHandler), context, Arc::clone(&self.sink));
        let timeout = self.config.listener.default_timeout;

        self.dispatch(&request.user, request_id, &command, timeout, Arc::new(callback))
    }

    fn dispatch(
        &self,
        user: &str,
        request_id: String,
        command: &str,
        timeout: Duration,
        callback: Arc<StatusCallback>,
    ) -> Result<Submission> {
        let directory = self.config.response_directory();
        ensure_directory(directory)?;

        let callback = Arc::new(ReleaseProcess {
            inner: callback,
            processes: self.executor.processes().clone(),
            process: ProcessId::new(user, &request_id),
        });
        let handle = self
            .listener
            .start(directory, &request_id, timeout, callback)?;

        let process = match self.executor.execute_async(user, &request_id, command) {
            Ok(process) => process,
            Err(e) => {
                warn!("Could not start command for {}: {}", request_id, e);
                handle.cancel();
                return Err(e.into());
            }
        };

        info!("Submitted request {} for {}", request_id, user);
        Ok(Submission {
            request_id,
            process,
            handle,
        })
    }

    /// Withdraw a submission: stop waiting for its response and kill its
    /// process if still running.
    pub fn cancel(&self, submission: &Submission) -> bool {
        let registration = submission.handle.cancel();
        let process = self
            .executor
            .cancel(&submission.process.user, &submission.process.request_id);
        self.executor.processes().release(&submission.process);
        registration || process
    }

    /// Cancel, then wait for the final state. A response picked up before
    /// the cancel is still reported, and this returns once it has been.
    pub async fn cancel_and_wait(&self, submission: &mut Submission) -> RegistrationState {
        self.cancel(submission);
        if !submission.handle.state().is_terminal() {
            info!(
                "Response for {} already picked up, waiting for its status update",
                submission.request_id
            );
        }
        submission.handle.wait().await
    }

    pub fn shutdown(&self) {
        self.listener.shutdown();
    }
}

/// Forgets the process record once the registration has been answered.
struct ReleaseProcess {
    inner: Arc<StatusCallback>,
    processes: ProcessTable,
    process: ProcessId,
}

#[async_trait]
impl FileHandlerCallback for ReleaseProcess {
    async fn handle(&self, outcome: ListenerOutcome) -> std::result::Result<(), CallbackError> {
        let result = self.inner.handle(outcome).await;
        self.processes.release(&self.process);
        result
    }
}

fn ensure_directory(directory: &Path) -> std::io::Result<()> {
    if !directory.is_dir() {
        info!("Creating response directory {}", directory.display());
        std::fs::create_dir_all(directory)?;
    }
    Ok(())
}

/// `<user>-<action>-<request id>`, restricted to characters docker accepts
/// in container names.
fn container_name(request: &ProvisioningRequest, request_id: &str) -> String {
    format!("{}-{}-{}", request.user, request.action, request_id)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

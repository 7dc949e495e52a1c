use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::table::ProcessTable;
use super::{CommandExecutor, ProcessId, ProcessInfo};
use crate::command::redact_command;
use crate::subprocess::{
    ExitStatus, ProcessCommand, ProcessCommandBuilder, ProcessError, ProcessOutput, ProcessRunner,
};

/// Runs command lines through `<shell> -c`.
#[derive(Clone)]
pub struct ShellCommandExecutor {
    runner: Arc<dyn ProcessRunner>,
    shell: String,
    timeout: Option<Duration>,
    table: ProcessTable,
}

impl ShellCommandExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, shell: impl Into<String>) -> Self {
        Self {
            runner,
            shell: shell.into(),
            timeout: None,
            table: ProcessTable::new(),
        }
    }

    /// Kill commands still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn process_command(&self, command: &str) -> ProcessCommand {
        let builder = ProcessCommandBuilder::shell(&self.shell, command);
        match self.timeout {
            Some(timeout) => builder.timeout(timeout).build(),
            None => builder.build(),
        }
    }

    async fn run(
        runner: Arc<dyn ProcessRunner>,
        table: ProcessTable,
        id: ProcessId,
        command: ProcessCommand,
    ) -> (Result<ProcessOutput, ProcessError>, Option<ProcessInfo>) {
        let result = runner.run(command).await;
        let info = table.finish(&id, &result);
        (result, info)
    }
}

#[async_trait]
impl CommandExecutor for ShellCommandExecutor {
    async fn execute_sync(
        &self,
        user: &str,
        request_id: &str,
        command: &str,
    ) -> Result<ProcessInfo, ProcessError> {
        let id = ProcessId::new(user, request_id);
        let started = self.table.start(id.clone(), redact_command(command));
        debug!("Running {} synchronously: {}", id, started.command);

        let (result, info) = Self::run(
            Arc::clone(&self.runner),
            self.table.clone(),
            id.clone(),
            self.process_command(command),
        )
        .await;
        let info = info.unwrap_or(started);

        match result {
            Ok(output) => match output.status {
                ExitStatus::Success => Ok(info),
                ExitStatus::Error(code) => {
                    error!("Command for {} exited with code {}", id, code);
                    Err(ProcessError::ExitCode {
                        code,
                        stderr: redact_command(&output.stderr),
                    })
                }
                ExitStatus::Signal(signal) => {
                    error!("Command for {} terminated by signal {}", id, signal);
                    Err(ProcessError::Signal(signal))
                }
            },
            Err(e) => {
                error!("Command for {} failed: {}", id, e);
                Err(e)
            }
        }
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
        let started = self.table.start(id.clone(), redact_command(command));
        info!("Starting {} in background: {}", id, started.command);

        let task = runtime.spawn({
            let runner = Arc::clone(&self.runner);
            let table = self.table.clone();
            let id = id.clone();
            let command = self.process_command(command);
            async move {
                let (result, _) = Self::run(runner, table, id.clone(), command).await;
                match result {
                    Ok(output) if output.status.success() => {
                        debug!("Background command for {} finished", id)
                    }
                    Ok(output) => warn!(
                        "Background command for {} ended with {:?}: {}",
                        id,
                        output.status,
                        redact_command(output.stderr.trim())
                    ),
                    Err(e) => error!("Background command for {} failed: {}", id, e),
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

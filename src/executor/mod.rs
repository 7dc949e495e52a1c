//! Command executor: runs provisioning command lines out of process and
//! tracks them by `(user, request id)`.
//!
//! The real executor hands `bash -c <command>` to a
//! [`ProcessRunner`](crate::subprocess::ProcessRunner). The mock executor
//! never starts a process; it answers with a synthetic response file in the
//! directory the command mounts at `/response`.

mod mock;
mod shell;
mod table;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::subprocess::ProcessError;

pub use mock::MockCommandExecutor;
pub use shell::ShellCommandExecutor;
pub use table::ProcessTable;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProcessId {
    pub user: String,
    pub request_id: String,
}

impl ProcessId {
    pub fn new(user: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            request_id: request_id.into(),
        }
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.request_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Completed { exit_code: i32 },
    Failed { reason: String },
    Cancelled,
}

impl ProcessStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ProcessStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub id: ProcessId,
    /// Command line with credentials masked.
    pub command: String,
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion. A non-zero exit is an error; the process
    /// table records the outcome either way.
    async fn execute_sync(
        &self,
        user: &str,
        request_id: &str,
        command: &str,
    ) -> Result<ProcessInfo, ProcessError>;

    /// Start `command` and return immediately. Failures only show up in logs
    /// and in the process table.
    fn execute_async(
        &self,
        user: &str,
        request_id: &str,
        command: &str,
    ) -> Result<ProcessId, ProcessError>;

    fn processes(&self) -> &ProcessTable;

    fn cancel(&self, user: &str, request_id: &str) -> bool {
        self.processes().cancel(&ProcessId::new(user, request_id))
    }
}

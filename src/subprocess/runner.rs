use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

use super::error::ProcessError;
use crate::command::redact::redact_command;

/// A command line handed to a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub shell: String,
    pub script: String,
    pub timeout: Option<Duration>,
}

impl ProcessCommand {
    /// Single-line rendering with credentials masked, safe to log or store.
    pub fn display_redacted(&self) -> String {
        format!("{} -c {}", self.shell, redact_command(&self.script))
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }

    fn from_std(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return ExitStatus::Success;
        }
        if let Some(code) = status.code() {
            return ExitStatus::Error(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signal(signal);
            }
        }
        ExitStatus::Error(1)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as child processes of the provisioning service.
///
/// Each child leads its own process group. When the future driving it is
/// dropped or times out, the whole group is killed, so every stage of an
/// `echo ... | docker run ...` pipeline goes down with the shell. This is how
/// the executor cancels an in-flight provisioning action.
pub struct TokioProcessRunner;

/// SIGKILLs a process group on drop unless disarmed.
struct GroupKill {
    pgid: Option<i32>,
}

impl GroupKill {
    fn arm(child: &tokio::process::Child) -> Self {
        Self {
            pgid: child.id().and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) => debug!("Killed process group {}", pgid),
                Err(Errno::ESRCH) => trace!("Process group {} already gone", pgid),
                Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl TokioProcessRunner {
    fn spawn(command: &ProcessCommand) -> Result<tokio::process::Child, ProcessError> {
        let mut cmd = tokio::process::Command::new(&command.shell);
        cmd.arg("-c")
            .arg(&command.script)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so docker clients do not receive our terminal signals
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", command.shell, e);
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::CommandNotFound(command.shell.clone())
            } else {
                ProcessError::SpawnFailed {
                    command: command.display_redacted(),
                    source: e,
                }
            }
        })
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();
        debug!("Executing subprocess: {}", command.display_redacted());

        let child = Self::spawn(&command)?;
        let mut group = GroupKill::arm(&child);
        let output = match command.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ProcessError::Timeout(limit))??,
            None => child.wait_with_output().await?,
        };
        group.disarm();

        let result = ProcessOutput {
            status: ExitStatus::from_std(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        };

        match result.status {
            ExitStatus::Success => debug!("Subprocess finished in {:?}", result.duration),
            ExitStatus::Error(code) => {
                debug!("Subprocess exited with {} after {:?}", code, result.duration);
                trace!("Stderr: {}", redact_command(&result.stderr));
            }
            ExitStatus::Signal(signal) => {
                warn!("Subprocess killed by signal {} after {:?}", signal, result.duration)
            }
        }
        Ok(result)
    }
}

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use super::{ProcessId, ProcessInfo, ProcessStatus};
use crate::subprocess::{ExitStatus, ProcessError, ProcessOutput};

struct Entry {
    info: ProcessInfo,
    abort: Option<AbortHandle>,
    /// Drop the record as soon as the process has finished.
    released: bool,
}

/// Processes started by an executor, keyed by `(user, request id)`.
#[derive(Clone, Default)]
pub struct ProcessTable {
    entries: Arc<Mutex<HashMap<ProcessId, Entry>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessId, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a new running process, replacing any earlier one with the same id.
    pub fn start(&self, id: ProcessId, command: String) -> ProcessInfo {
        let info = ProcessInfo {
            id: id.clone(),
            command,
            status: ProcessStatus::Running,
            stdout: String::new(),
            stderr: String::new(),
            started_at: Utc::now(),
            finished_at: None,
        };
        if let Some(previous) = self.lock().insert(
            id.clone(),
            Entry {
                info: info.clone(),
                abort: None,
                released: false,
            },
        ) {
            debug!(
                "Replacing process record for {} ({:?})",
                id, previous.info.status
            );
        }
        info
    }

    pub fn attach(&self, id: &ProcessId, abort: AbortHandle) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.abort = Some(abort);
        }
    }

    /// Record how a process ended. A cancelled process stays cancelled.
    pub fn finish(
        &self,
        id: &ProcessId,
        result: &Result<ProcessOutput, ProcessError>,
    ) -> Option<ProcessInfo> {
        let mut entries = self.lock();
        let entry = entries.get_mut(id)?;
        if entry.info.status == ProcessStatus::Cancelled {
            let info = entry.info.clone();
            if entry.released {
                entries.remove(id);
            }
            return Some(info);
        }

        entry.info.status = match result {
            Ok(output) => match output.status {
                ExitStatus::Success => ProcessStatus::Completed { exit_code: 0 },
                ExitStatus::Error(code) => ProcessStatus::Completed { exit_code: code },
                ExitStatus::Signal(signal) => ProcessStatus::Failed {
                    reason: format!("terminated by signal {signal}"),
                },
            },
            Err(e) => ProcessStatus::Failed {
                reason: e.to_string(),
            },
        };
        if let Ok(output) = result {
            entry.info.stdout = output.stdout.clone();
            entry.info.stderr = output.stderr.clone();
        }
        entry.info.finished_at = Some(Utc::now());
        entry.abort = None;
        let info = entry.info.clone();
        if entry.released {
            debug!("Dropping record of {}", id);
            entries.remove(id);
        }
        Some(info)
    }

    pub fn get(&self, id: &ProcessId) -> Option<ProcessInfo> {
        self.lock().get(id).map(|entry| entry.info.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop a running process. Aborting its task drops the child, which
    /// kills it.
    pub fn cancel(&self, id: &ProcessId) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        if entry.info.status.is_finished() {
            return false;
        }
        if let Some(abort) = entry.abort.take() {
            abort.abort();
        }
        entry.info.status = ProcessStatus::Cancelled;
        entry.info.finished_at = Some(Utc::now());
        info!("Cancelled process {}", id);
        true
    }

    /// Nobody will look `id` up again. A finished record goes now, a
    /// running one when its process ends.
    pub fn release(&self, id: &ProcessId) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        if entry.info.status.is_finished() {
            entries.remove(id);
        } else {
            entry.released = true;
        }
    }
}

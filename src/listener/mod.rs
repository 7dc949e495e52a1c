//! Folder listener: correlates JSON response files written by provisioning
//! containers with the requests that are waiting for them.
//!
//! All registrations on one directory share a single scan task. A scan runs
//! every `poll_interval`, and earlier when filesystem events arrive. A file
//! is only handed out once it has stopped changing, and at most one
//! registration ever receives it.

mod folder;
mod naming;
mod outcome;
mod scan;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub use folder::{FolderListener, RegistrationHandle};
pub use naming::{matches_request, response_file_name};
pub use outcome::{ChannelCallback, FileHandlerCallback, ListenerOutcome, RegistrationState};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Not a directory: {0}")]
    InvalidDirectory(PathBuf),

    #[error("Request id must not be empty")]
    EmptyRequestId,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Folder listener requires a running tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub poll_interval: Duration,
    /// Minimum time a file must go unchanged before it is read.
    pub settle_time: Duration,
    pub unmatched_grace: Duration,
    pub delete_processed_files: bool,
    pub use_fs_events: bool,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            settle_time: Duration::from_millis(500),
            unmatched_grace: Duration::from_secs(600),
            delete_processed_files: true,
            use_fs_events: true,
        }
    }
}

impl ListenerSettings {
    /// Settings with both the poll interval and the settle time set to `interval`.
    pub fn polling_every(interval: Duration) -> Self {
        Self {
            poll_interval: interval,
            settle_time: interval,
            ..Self::default()
        }
    }
}

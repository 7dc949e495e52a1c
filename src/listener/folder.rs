use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use super::naming::matches_request;
use super::outcome::{FileHandlerCallback, ListenerOutcome, RegistrationState};
use super::scan::{scan_directory, FileTracker, ScannedFile};
use super::{ListenerError, ListenerSettings};

struct Registration {
    request_id: String,
    timeout: Duration,
    deadline: Instant,
    callback: Arc<dyn FileHandlerCallback>,
    state: watch::Sender<RegistrationState>,
}

#[derive(Default)]
struct DirectoryState {
    /// Keyed by registration id, so iteration order is registration order.
    registrations: BTreeMap<u64, Registration>,
    tracker: FileTracker,
}

struct Inner {
    settings: ListenerSettings,
    directories: Mutex<HashMap<PathBuf, DirectoryState>>,
    next_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, DirectoryState>> {
        self.directories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Dispatch {
    File {
        registration: Registration,
        file: ScannedFile,
    },
    Timeout {
        registration: Registration,
    },
}

/// Shared registry of pending response-file registrations.
///
/// Cloning is cheap; clones share registrations and scan tasks.
#[derive(Clone)]
pub struct FolderListener {
    inner: Arc<Inner>,
}

impl FolderListener {
    pub fn new(settings: ListenerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                directories: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &ListenerSettings {
        &self.inner.settings
    }

    /// Wait for the response file of `request_id` in `directory`.
    ///
    /// The callback runs exactly once, with the matched file or with
    /// [`ListenerOutcome::TimedOut`], unless the registration is cancelled
    /// first. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        directory: impl AsRef<Path>,
        request_id: &str,
        timeout: Duration,
        callback: Arc<dyn FileHandlerCallback>,
    ) -> Result<RegistrationHandle, ListenerError> {
        if request_id.is_empty() {
            return Err(ListenerError::EmptyRequestId);
        }
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(ListenerError::InvalidDirectory(directory.to_path_buf()));
        }
        let directory = std::fs::canonicalize(directory)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (state_tx, state_rx) = watch::channel(RegistrationState::Watching);
        let registration = Registration {
            request_id: request_id.to_string(),
            timeout,
            deadline: Instant::now() + timeout,
            callback,
            state: state_tx,
        };

        let spawn_scanner = {
            let mut directories = self.inner.lock();
            let is_new = !directories.contains_key(&directory);
            directories
                .entry(directory.clone())
                .or_default()
                .registrations
                .insert(id, registration);
            is_new
        };

        info!(
            "Waiting up to {:?} for response {} in {}",
            timeout,
            request_id,
            directory.display()
        );

        if spawn_scanner {
            debug!("Starting scanner for {}", directory.display());
            runtime.spawn(Self::scan_loop(Arc::clone(&self.inner), directory.clone()));
        }

        Ok(RegistrationHandle {
            id,
            request_id: request_id.to_string(),
            directory,
            inner: Arc::clone(&self.inner),
            state: state_rx,
        })
    }

    /// Number of registrations still waiting for a file.
    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .values()
            .map(|dir| dir.registrations.len())
            .sum()
    }

    /// Cancel every pending registration. Scan tasks stop on their next tick.
    pub fn shutdown(&self) {
        let mut directories = self.inner.lock();
        let mut cancelled = 0;
        for state in directories.values_mut() {
            for (_, registration) in std::mem::take(&mut state.registrations) {
                registration.state.send_replace(RegistrationState::Cancelled);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!("Cancelled {} pending registrations", cancelled);
        }
    }

    async fn scan_loop(inner: Arc<Inner>, directory: PathBuf) {
        let settings = inner.settings.clone();
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = if settings.use_fs_events {
            Self::watch_events(&directory, wake_tx)
        } else {
            None
        };

        let mut interval = tokio::time::interval(settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(()) = wake_rx.recv() => trace!("Woken by filesystem event"),
            }

            let scan = match scan_directory(&directory).await {
                Ok(files) => files,
                Err(e) => {
                    debug!("Failed to scan {}: {}", directory.display(), e);
                    Vec::new()
                }
            };

            let Some(dispatches) = Self::process_scan(&inner, &directory, scan) else {
                debug!("No pending registrations left in {}", directory.display());
                return;
            };

            for dispatch in dispatches {
                tokio::spawn(Self::deliver(settings.clone(), dispatch));
            }
        }
    }

    /// Settle registrations against one scan. `None` once the directory has
    /// nothing left to wait for.
    fn process_scan(
        inner: &Inner,
        directory: &Path,
        scan: Vec<ScannedFile>,
    ) -> Option<Vec<Dispatch>> {
        let mut directories = inner.lock();
        let state = directories.get_mut(directory)?;
        if state.registrations.is_empty() {
            directories.remove(directory);
            return None;
        }

        let now = Instant::now();
        let settings = &inner.settings;
        let mut dispatches = Vec::new();
        let mut unclaimed = Vec::new();

        for file in state.tracker.observe(scan, settings.settle_time, now) {
            let matched = state
                .registrations
                .iter()
                .find(|(_, r)| matches_request(&file.name, &r.request_id))
                .map(|(id, _)| *id);

            match matched.and_then(|id| state.registrations.remove(&id)) {
                Some(registration) => {
                    state.tracker.claim(&file.path);
                    registration.state.send_replace(RegistrationState::Matched);
                    dispatches.push(Dispatch::File { registration, file });
                }
                None => unclaimed.push(file),
            }
        }
        state
            .tracker
            .expire_unclaimed(&unclaimed, settings.unmatched_grace, now);

        let expired: Vec<u64> = state
            .registrations
            .iter()
            .filter(|(_, r)| r.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(registration) = state.registrations.remove(&id) {
                dispatches.push(Dispatch::Timeout { registration });
            }
        }

        Some(dispatches)
    }

    fn watch_events(directory: &Path, wake: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
        let handler = move |result: notify::Result<Event>| match result {
            Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                // A full channel already holds a pending wakeup
                let _ = wake.try_send(());
            }
            Ok(_) => {}
            Err(e) => debug!("Filesystem watcher error: {}", e),
        };

        let watcher = notify::recommended_watcher(handler).and_then(|mut watcher| {
            watcher.watch(directory, RecursiveMode::NonRecursive)?;
            Ok(watcher)
        });
        match watcher {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Falling back to polling {}: {}", directory.display(), e);
                None
            }
        }
    }

    async fn deliver(settings: ListenerSettings, dispatch: Dispatch) {
        let (registration, outcome, terminal) = match dispatch {
            Dispatch::File { registration, file } => {
                let outcome = Self::read_response(&file.path).await;
                if settings.delete_processed_files {
                    if let Err(e) = tokio::fs::remove_file(&file.path).await {
                        warn!("Failed to remove {}: {}", file.path.display(), e);
                    }
                }
                (registration, outcome, RegistrationState::Delivered)
            }
            Dispatch::Timeout { registration } => {
                warn!(
                    "No response for {} after {:?}",
                    registration.request_id, registration.timeout
                );
                let outcome = ListenerOutcome::TimedOut {
                    request_id: registration.request_id.clone(),
                    waited: registration.timeout,
                };
                (registration, outcome, RegistrationState::TimedOut)
            }
        };

        let callback = Arc::clone(&registration.callback);
        let request_id = registration.request_id.clone();
        match tokio::spawn(async move { callback.handle(outcome).await }).await {
            Ok(Ok(())) => debug!("Callback for {} completed", request_id),
            Ok(Err(e)) => error!("Callback for {} failed: {}", request_id, e),
            Err(e) => error!("Callback for {} panicked: {}", request_id, e),
        }

        registration.state.send_replace(terminal);
    }

    async fn read_response(path: &Path) -> ListenerOutcome {
        let parsed = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(content) => {
                info!("Received response file {}", path.display());
                ListenerOutcome::Matched {
                    file: path.to_path_buf(),
                    content,
                }
            }
            Err(reason) => {
                warn!("Malformed response file {}: {}", path.display(), reason);
                ListenerOutcome::Malformed {
                    file: path.to_path_buf(),
                    reason,
                }
            }
        }
    }
}

/// Caller's view of one registration.
pub struct RegistrationHandle {
    id: u64,
    request_id: String,
    directory: PathBuf,
    inner: Arc<Inner>,
    state: watch::Receiver<RegistrationState>,
}

impl RegistrationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    /// Withdraw the registration. Returns `false` if it already matched or
    /// timed out, in which case its callback still runs.
    pub fn cancel(&self) -> bool {
        let registration = self
            .inner
            .lock()
            .get_mut(&self.directory)
            .and_then(|state| state.registrations.remove(&self.id));

        match registration {
            Some(registration) => {
                registration.state.send_replace(RegistrationState::Cancelled);
                info!("Cancelled wait for response {}", self.request_id);
                true
            }
            None => false,
        }
    }

    /// Resolve once the registration reaches a terminal state.
    pub async fn wait(&mut self) -> RegistrationState {
        match self.state.wait_for(RegistrationState::is_terminal).await {
            Ok(state) => *state,
            // Sender dropped without a terminal state
            Err(_) => RegistrationState::Cancelled,
        }
    }
}

impl std::fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("id", &self.id)
            .field("request_id", &self.request_id)
            .field("directory", &self.directory)
            .field("state", &self.state())
            .finish()
    }
}

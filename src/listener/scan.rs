//! Directory snapshots and the bookkeeping that decides when a file is
//! finished being written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// One `*.json` entry as seen by a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScannedFile {
    pub path: PathBuf,
    pub name: String,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// List the JSON files in `directory`.
pub(crate) async fn scan_directory(directory: &Path) -> std::io::Result<Vec<ScannedFile>> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(".json") || name.starts_with('.') {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            // Removed between listing and stat
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        files.push(ScannedFile {
            path: entry.path(),
            name,
            len: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

#[derive(Debug)]
struct Observation {
    len: u64,
    modified: Option<SystemTime>,
    first_seen: Instant,
    changed_at: Instant,
    unchanged_scans: u32,
    claimed: bool,
    ignored: bool,
}

/// Per-directory memory of what earlier scans saw.
#[derive(Debug, Default)]
pub(crate) struct FileTracker {
    files: HashMap<PathBuf, Observation>,
}

impl FileTracker {
    /// Record a scan and return the files that are complete and unclaimed.
    ///
    /// A file is complete once two consecutive scans saw the same non-zero
    /// length and modification time, and it has not changed for at least
    /// `settle_time`.
    pub fn observe(
        &mut self,
        scan: Vec<ScannedFile>,
        settle_time: Duration,
        now: Instant,
    ) -> Vec<ScannedFile> {
        let mut ready = Vec::new();
        self.files
            .retain(|path, _| scan.iter().any(|file| &file.path == path));

        for file in scan {
            let observation = self
                .files
                .entry(file.path.clone())
                .or_insert_with(|| Observation {
                    len: file.len,
                    modified: file.modified,
                    first_seen: now,
                    changed_at: now,
                    unchanged_scans: 0,
                    claimed: false,
                    ignored: false,
                });

            if observation.len != file.len || observation.modified != file.modified {
                observation.len = file.len;
                observation.modified = file.modified;
                observation.changed_at = now;
                observation.unchanged_scans = 0;
                continue;
            }
            if observation.changed_at != now {
                observation.unchanged_scans += 1;
            }

            let settled = now.duration_since(observation.changed_at) >= settle_time;
            if observation.unchanged_scans >= 1
                && settled
                && file.len > 0
                && !observation.claimed
                && !observation.ignored
            {
                ready.push(file);
            }
        }
        ready
    }

    pub fn claim(&mut self, path: &Path) {
        if let Some(observation) = self.files.get_mut(path) {
            observation.claimed = true;
        }
    }

    /// Stop offering files nobody claimed within `grace`, logging each once.
    pub fn expire_unclaimed(&mut self, candidates: &[ScannedFile], grace: Duration, now: Instant) {
        for file in candidates {
            let Some(observation) = self.files.get_mut(&file.path) else {
                continue;
            };
            if observation.claimed || observation.ignored {
                continue;
            }
            if now.duration_since(observation.first_seen) >= grace {
                observation.ignored = true;
                warn!(
                    "Ignoring response file {} with no pending request after {:?}",
                    file.path.display(),
                    grace
                );
            } else {
                debug!("No pending request for {} yet", file.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, len: u64, modified: u64) -> ScannedFile {
        ScannedFile {
            path: PathBuf::from("/resp").join(name),
            name: name.to_string(),
            len,
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(modified)),
        }
    }

    #[test]
    fn test_file_ready_after_two_identical_scans() {
        let mut tracker = FileTracker::default();
        let settle = Duration::from_millis(100);
        let t0 = Instant::now();

        assert!(tracker.observe(vec![file("a.json", 10, 1)], settle, t0).is_empty());
        let ready = tracker.observe(vec![file("a.json", 10, 1)], settle, t0 + settle);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "a.json");
    }

    #[test]
    fn test_growing_file_is_never_ready() {
        let mut tracker = FileTracker::default();
        let settle = Duration::from_millis(50);
        let t0 = Instant::now();

        for step in 0..5u64 {
            let now = t0 + settle * (step as u32 + 1);
            let ready = tracker.observe(vec![file("a.json", 10 + step, 1 + step)], settle, now);
            assert!(ready.is_empty());
        }
    }

    #[test]
    fn test_settle_time_applies_to_fast_rescans() {
        let mut tracker = FileTracker::default();
        let settle = Duration::from_millis(200);
        let t0 = Instant::now();

        tracker.observe(vec![file("a.json", 10, 1)], settle, t0);
        let early = tracker.observe(
            vec![file("a.json", 10, 1)],
            settle,
            t0 + Duration::from_millis(5),
        );
        assert!(early.is_empty());
        let late = tracker.observe(vec![file("a.json", 10, 1)], settle, t0 + settle);
        assert_eq!(late.len(), 1);
    }

    #[test]
    fn test_empty_and_claimed_files_are_skipped() {
        let mut tracker = FileTracker::default();
        let settle = Duration::ZERO;
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(1);

        tracker.observe(vec![file("empty.json", 0, 1), file("b.json", 5, 1)], settle, t0);
        let ready = tracker.observe(vec![file("empty.json", 0, 1), file("b.json", 5, 1)], settle, t1);
        assert_eq!(ready.len(), 1);

        tracker.claim(&ready[0].path);
        let t2 = t1 + Duration::from_millis(1);
        assert!(tracker
            .observe(vec![file("b.json", 5, 1)], settle, t2)
            .is_empty());
    }

    #[test]
    fn test_unclaimed_files_expire_after_grace() {
        let mut tracker = FileTracker::default();
        let settle = Duration::ZERO;
        let grace = Duration::from_secs(1);
        let t0 = Instant::now();

        tracker.observe(vec![file("stray.json", 5, 1)], settle, t0);
        let t1 = t0 + Duration::from_millis(10);
        let ready = tracker.observe(vec![file("stray.json", 5, 1)], settle, t1);
        tracker.expire_unclaimed(&ready, grace, t1);
        assert_eq!(ready.len(), 1);

        let t2 = t0 + grace;
        let ready = tracker.observe(vec![file("stray.json", 5, 1)], settle, t2);
        tracker.expire_unclaimed(&ready, grace, t2);
        let t3 = t2 + Duration::from_millis(10);
        assert!(tracker
            .observe(vec![file("stray.json", 5, 1)], settle, t3)
            .is_empty());
    }

    #[test]
    fn test_vanished_files_are_forgotten() {
        let mut tracker = FileTracker::default();
        let t0 = Instant::now();
        tracker.observe(vec![file("a.json", 5, 1)], Duration::ZERO, t0);
        tracker.observe(Vec::new(), Duration::ZERO, t0 + Duration::from_millis(1));
        assert!(tracker.files.is_empty());
    }
}

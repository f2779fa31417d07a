use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::poll::{Poller, PollingThread, ThreadState};
use super::{Callback, Callbacks, Dispatch, FileEvent, ObserverId, Signal};
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::{CovwatchError, Result};

/// Files are hashed this many bytes at a time.
pub const CHUNK_SIZE: usize = 1024 * 1024;

pub type ContentHash = [u8; 32];

/// Last observed state of a watched file. Both fields are `None` when the
/// file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchState {
    pub mtime: Option<SystemTime>,
    pub hash: Option<ContentHash>,
}

impl WatchState {
    /// Snapshot `path`. A path whose content cannot be read is captured
    /// as absent.
    pub fn capture(path: &Path) -> Self {
        let mtime = mtime(path);
        match content_hash(path) {
            Some(hash) if mtime.is_some() => Self {
                mtime,
                hash: Some(hash),
            },
            _ => Self::default(),
        }
    }

    pub fn exists(&self) -> bool {
        self.mtime.is_some()
    }
}

/// Modification time of `path`, or `None` if it cannot be read.
pub fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// SHA-256 of the file's content. A file that does not exist, or that fails
/// to read part-way through, hashes to `None`.
pub fn content_hash(path: &Path) -> Option<ContentHash> {
    let mut file = File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return None,
        }
    }
    Some(hasher.finalize().into())
}

/// Classify the change between two snapshots. Equal mtimes mean no event,
/// whether the file is untouched or still absent.
pub fn classify(last: &WatchState, current: &WatchState) -> Option<FileEvent> {
    if last.mtime == current.mtime {
        return None;
    }
    let event = match (last.mtime, current.mtime) {
        (None, Some(_)) => FileEvent::Created,
        (Some(_), None) => FileEvent::Deleted,
        _ if last.hash != current.hash => FileEvent::Modified,
        _ => FileEvent::Unchanged,
    };
    Some(event)
}

struct Shared<D: Dispatch> {
    dispatch: D,
    callbacks: Mutex<Callbacks<D::Payload>>,
}

/// Poll loop state. Lives on the watcher's thread; nothing else touches
/// the snapshot.
struct FilePoller<D: Dispatch> {
    path: PathBuf,
    last: WatchState,
    shared: Arc<Shared<D>>,
}

impl<D: Dispatch> FilePoller<D> {
    fn poll_once(&mut self) -> Option<FileEvent> {
        if mtime(&self.path) == self.last.mtime {
            return None;
        }

        let current = WatchState::capture(&self.path);
        let event = classify(&self.last, &current);
        if let Some(event) = event {
            dispatch(&self.shared, &self.path, event);
        }
        self.last = current;
        event
    }
}

impl<D: Dispatch> Poller for FilePoller<D> {
    fn poll(&mut self) {
        self.poll_once();
    }
}

fn dispatch<D: Dispatch>(shared: &Shared<D>, path: &Path, event: FileEvent) {
    // Copy the registrations out so callbacks run without the lock held.
    let callbacks = shared.callbacks.lock().for_event(event);
    debug!(
        "[watcher] {event} '{}', {} callbacks",
        path.display(),
        callbacks.len()
    );
    if callbacks.is_empty() {
        return;
    }

    let payload = shared.dispatch.payload(path, event);
    for callback in callbacks {
        callback.on_event(event, payload.clone());
    }
}

/// Watches one file on a dedicated polling thread.
pub struct FileWatcher<D: Dispatch = Signal> {
    path: PathBuf,
    shared: Arc<Shared<D>>,
    thread: PollingThread,
}

impl FileWatcher<Signal> {
    /// A watcher whose callbacks receive no payload.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_dispatch(path, Signal)
    }
}

impl<D: Dispatch> FileWatcher<D> {
    pub fn with_dispatch(path: impl Into<PathBuf>, dispatch: D) -> Self {
        let path = path.into();
        Self {
            thread: PollingThread::new(path.clone(), DEFAULT_POLL_INTERVAL),
            path,
            shared: Arc::new(Shared {
                dispatch,
                callbacks: Mutex::new(Callbacks::new()),
            }),
        }
    }

    /// Set the tick between polls. Only effective before `start`.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.thread.set_interval(interval);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dispatcher(&self) -> &D {
        &self.shared.dispatch
    }

    pub fn add_callback(
        &self,
        events: &[FileEvent],
        id: ObserverId,
        callback: Arc<dyn Callback<D::Payload>>,
    ) {
        self.shared.callbacks.lock().add(events, id, callback);
    }

    pub fn remove_callback(&self, id: ObserverId) {
        self.shared.callbacks.lock().remove(id);
    }

    pub fn has_callbacks(&self) -> bool {
        !self.shared.callbacks.lock().is_empty()
    }

    /// Number of observers with at least one registered callback.
    pub fn callback_count(&self) -> usize {
        self.shared.callbacks.lock().observer_count()
    }

    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }

    pub fn is_running(&self) -> bool {
        self.thread.state() == ThreadState::Running
    }

    pub fn is_alive(&self) -> bool {
        self.thread.is_alive()
    }

    /// Take the baseline snapshot, then start polling. The first poll
    /// compares against that baseline, so a file that already exists is
    /// not reported as created.
    pub fn start(&mut self) -> Result<()> {
        match self.thread.state() {
            ThreadState::Running | ThreadState::Stopping => return Ok(()),
            ThreadState::Stopped => return Err(CovwatchError::WatcherStopped),
            ThreadState::NotStarted => {}
        }

        let last = WatchState::capture(&self.path);
        if last.exists() {
            debug!("[watcher] exists: {}", self.path.display());
        } else {
            debug!("[watcher] doesn't exist: {}", self.path.display());
        }

        self.thread.start(FilePoller {
            path: self.path.clone(),
            last,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Stop polling, waiting up to `timeout` for the thread to exit.
    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.thread.stop(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state(mtime_secs: Option<u64>, hash: Option<u8>) -> WatchState {
        WatchState {
            mtime: mtime_secs.map(|s| SystemTime::UNIX_EPOCH + Duration::from_secs(s)),
            hash: hash.map(|b| [b; 32]),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&state(None, None), &state(None, None)), None);
        assert_eq!(classify(&state(Some(1), Some(1)), &state(Some(1), Some(2))), None);
        assert_eq!(
            classify(&state(None, None), &state(Some(1), Some(1))),
            Some(FileEvent::Created)
        );
        assert_eq!(
            classify(&state(Some(1), Some(1)), &state(None, None)),
            Some(FileEvent::Deleted)
        );
        assert_eq!(
            classify(&state(Some(1), Some(1)), &state(Some(2), Some(2))),
            Some(FileEvent::Modified)
        );
        assert_eq!(
            classify(&state(Some(1), Some(1)), &state(Some(2), Some(1))),
            Some(FileEvent::Unchanged)
        );
    }

    #[test]
    fn test_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "same").unwrap();
        std::fs::write(&b, "same").unwrap();

        assert!(content_hash(&a).is_some());
        assert_eq!(content_hash(&a), content_hash(&b));

        std::fs::write(&b, "different").unwrap();
        assert_ne!(content_hash(&a), content_hash(&b));

        assert_eq!(content_hash(&dir.path().join("missing.txt")), None);
    }

    #[test]
    fn test_content_hash_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("big_a.bin");
        let b = dir.path().join("big_b.bin");
        let mut content = vec![7u8; CHUNK_SIZE * 2 + 10];
        std::fs::write(&a, &content).unwrap();
        *content.last_mut().unwrap() = 8;
        std::fs::write(&b, &content).unwrap();
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    fn poller(path: &Path, counter: &Arc<AtomicUsize>, events: &[FileEvent]) -> FilePoller<Signal> {
        let shared = Arc::new(Shared {
            dispatch: Signal,
            callbacks: Mutex::new(Callbacks::new()),
        });
        let seen = Arc::clone(counter);
        shared.callbacks.lock().add(
            events,
            ObserverId(1),
            Arc::new(move |_: FileEvent, _: ()| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        FilePoller {
            path: path.to_path_buf(),
            last: WatchState::capture(path),
            shared,
        }
    }

    fn bump_mtime(path: &Path, secs: u64) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        let mtime = file.metadata().unwrap().modified().unwrap();
        file.set_modified(mtime + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_poll_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched.txt");
        let hits = Arc::new(AtomicUsize::new(0));
        let mut p = poller(&path, &hits, &FileEvent::ALL);

        assert_eq!(p.poll_once(), None);

        std::fs::write(&path, "one").unwrap();
        assert_eq!(p.poll_once(), Some(FileEvent::Created));
        assert_eq!(p.poll_once(), None);

        std::fs::write(&path, "two").unwrap();
        bump_mtime(&path, 10);
        assert_eq!(p.poll_once(), Some(FileEvent::Modified));

        std::fs::write(&path, "two").unwrap();
        bump_mtime(&path, 20);
        assert_eq!(p.poll_once(), Some(FileEvent::Unchanged));

        std::fs::remove_file(&path).unwrap();
        assert_eq!(p.poll_once(), Some(FileEvent::Deleted));
        assert_eq!(p.poll_once(), None);

        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_snapshot_updates_without_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched.txt");
        let hits = Arc::new(AtomicUsize::new(0));
        // Only interested in deletion.
        let mut p = poller(&path, &hits, &[FileEvent::Deleted]);

        std::fs::write(&path, "one").unwrap();
        assert_eq!(p.poll_once(), Some(FileEvent::Created));
        assert!(p.last.exists());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(p.poll_once(), Some(FileEvent::Deleted));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unreadable_path_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched.txt");
        let hits = Arc::new(AtomicUsize::new(0));
        let mut p = poller(&path, &hits, &FileEvent::ALL);

        std::fs::create_dir(&path).unwrap();
        assert_eq!(p.poll_once(), None);
        assert!(!p.last.exists());

        std::fs::remove_dir(&path).unwrap();
        std::fs::write(&path, "one").unwrap();
        assert_eq!(p.poll_once(), Some(FileEvent::Created));

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert_eq!(p.poll_once(), Some(FileEvent::Deleted));
        assert_eq!(p.poll_once(), None);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher =
            FileWatcher::new(dir.path().join("x.txt")).with_interval(Duration::from_millis(10));
        assert_eq!(watcher.state(), ThreadState::NotStarted);

        watcher.start().unwrap();
        assert!(watcher.is_running());
        watcher.start().unwrap();

        watcher.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(watcher.state(), ThreadState::Stopped);
        assert!(!watcher.is_alive());
        assert!(matches!(watcher.start(), Err(CovwatchError::WatcherStopped)));
    }
}

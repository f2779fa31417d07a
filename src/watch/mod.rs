//! Polling file watchers.
//!
//! A [`FileWatcher`] owns one background thread that samples a single
//! file's mtime and content hash, classifies each change into a
//! [`FileEvent`], and calls the callbacks registered for that event. What
//! the callbacks receive is decided by the watcher's [`Dispatch`]: nothing
//! for a plain watcher, a fresh coverage report for a [`CoverageWatcher`].

pub mod coverage;
pub mod file;
pub mod poll;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use coverage::{CoverageDispatch, CoverageWatcher};
pub use file::{classify, content_hash, mtime, FileWatcher, WatchState};
pub use poll::{Poller, PollingThread, ThreadState};

/// What happened to a watched file between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileEvent {
    /// Did not exist before, does now.
    Created,
    /// Existed before, does not now.
    Deleted,
    /// mtime changed and the content differs.
    Modified,
    /// mtime changed but the content is identical.
    Unchanged,
}

impl FileEvent {
    pub const ALL: [FileEvent; 4] = [
        FileEvent::Created,
        FileEvent::Deleted,
        FileEvent::Modified,
        FileEvent::Unchanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileEvent::Created => "created",
            FileEvent::Deleted => "deleted",
            FileEvent::Modified => "modified",
            FileEvent::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable handle identifying whoever registered a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives watcher events together with the dispatch payload.
pub trait Callback<P>: Send + Sync {
    fn on_event(&self, event: FileEvent, payload: P);
}

impl<P, F> Callback<P> for F
where
    F: Fn(FileEvent, P) + Send + Sync,
{
    fn on_event(&self, event: FileEvent, payload: P) {
        self(event, payload)
    }
}

/// Produces the value handed to callbacks for one dispatch. Called only when
/// at least one callback is registered for the event.
pub trait Dispatch: Send + Sync + 'static {
    type Payload: Clone + Send + 'static;

    fn payload(&self, path: &Path, event: FileEvent) -> Self::Payload;
}

/// Plain dispatch: callbacks only learn which event happened.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signal;

impl Dispatch for Signal {
    type Payload = ();

    fn payload(&self, _path: &Path, _event: FileEvent) {}
}

/// Callback registrations of one watcher, per event kind, keyed by observer.
pub struct Callbacks<P> {
    by_event: HashMap<FileEvent, BTreeMap<ObserverId, Arc<dyn Callback<P>>>>,
}

impl<P> Callbacks<P> {
    pub fn new() -> Self {
        Self {
            by_event: HashMap::new(),
        }
    }

    /// Register `callback` for each of `events`. An observer that already
    /// has a callback for an event keeps the existing one.
    pub fn add(&mut self, events: &[FileEvent], id: ObserverId, callback: Arc<dyn Callback<P>>) {
        for event in events {
            self.by_event
                .entry(*event)
                .or_default()
                .entry(id)
                .or_insert_with(|| Arc::clone(&callback));
        }
    }

    /// Drop every registration made by `id`.
    pub fn remove(&mut self, id: ObserverId) {
        for callbacks in self.by_event.values_mut() {
            callbacks.remove(&id);
        }
        self.by_event.retain(|_, callbacks| !callbacks.is_empty());
    }

    pub fn is_empty(&self) -> bool {
        self.by_event.values().all(BTreeMap::is_empty)
    }

    /// Number of distinct observers with at least one registration.
    pub fn observer_count(&self) -> usize {
        let mut ids: Vec<ObserverId> = self
            .by_event
            .values()
            .flat_map(|callbacks| callbacks.keys().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Snapshot of the callbacks registered for `event`, in observer order.
    pub fn for_event(&self, event: FileEvent) -> Vec<Arc<dyn Callback<P>>> {
        self.by_event
            .get(&event)
            .map(|callbacks| callbacks.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl<P> Default for Callbacks<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn Callback<()>>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let callback: Arc<dyn Callback<()>> = Arc::new(move |_: FileEvent, _: ()| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[test]
    fn test_add_and_remove() {
        let mut callbacks = Callbacks::new();
        assert!(callbacks.is_empty());

        let (_, cb) = counter();
        callbacks.add(&[FileEvent::Created, FileEvent::Deleted], ObserverId(1), cb.clone());
        callbacks.add(&[FileEvent::Created], ObserverId(2), cb);
        assert_eq!(callbacks.observer_count(), 2);
        assert_eq!(callbacks.for_event(FileEvent::Created).len(), 2);
        assert_eq!(callbacks.for_event(FileEvent::Modified).len(), 0);

        callbacks.remove(ObserverId(1));
        assert_eq!(callbacks.observer_count(), 1);
        assert!(callbacks.for_event(FileEvent::Deleted).is_empty());

        callbacks.remove(ObserverId(2));
        assert!(callbacks.is_empty());
    }

    #[test]
    fn test_existing_registration_is_kept() {
        let mut callbacks = Callbacks::new();
        let (first_hits, first) = counter();
        let (second_hits, second) = counter();
        callbacks.add(&[FileEvent::Modified], ObserverId(7), first);
        callbacks.add(&[FileEvent::Modified], ObserverId(7), second);

        for cb in callbacks.for_event(FileEvent::Modified) {
            cb.on_event(FileEvent::Modified, ());
        }
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_names() {
        let names: Vec<String> = FileEvent::ALL.iter().map(|e| e.to_string()).collect();
        assert_eq!(names, ["created", "deleted", "modified", "unchanged"]);
    }
}

//! Multiplexes observers (editor views) onto shared coverage watchers.
//!
//! Each observer is resolved to the coverage report that covers its source
//! file. Observers resolving to the same report share one
//! [`CoverageWatcher`]; the watcher is created and started with its first
//! observer and stopped and dropped when its last observer is removed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::executor::Executor;
use crate::locate::CoverageLocator;
use crate::matcher::InclusionMatcher;
use crate::paths;
use crate::report::{CloverReports, CoverageReport, ReportFactory};
use crate::watch::{Callback, CoverageWatcher, FileEvent, FileWatcher, ObserverId};

/// Something interested in coverage for one source file.
pub trait Observer: Send + Sync + 'static {
    fn id(&self) -> ObserverId;

    /// Source file shown by the observer; `None` for unsaved buffers.
    fn file_name(&self) -> Option<PathBuf>;
}

/// Receives the report for an observer after a change to its coverage file.
/// `None` means there is no coverage to show and annotations should be
/// cleared.
pub trait CoverageHandler<O>: Send + Sync {
    fn on_coverage_event(&self, observer: &O, report: Option<Arc<CoverageReport>>);
}

impl<O, F> CoverageHandler<O> for F
where
    F: Fn(&O, Option<Arc<CoverageReport>>) + Send + Sync,
{
    fn on_coverage_event(&self, observer: &O, report: Option<Arc<CoverageReport>>) {
        self(observer, report)
    }
}

/// Registration stored on a watcher for one observer and event kind.
struct ObserverCallback<O> {
    observer: Arc<O>,
    handler: Arc<dyn CoverageHandler<O>>,
    executor: Arc<dyn Executor>,
}

impl<O: Observer> Callback<Arc<CoverageReport>> for ObserverCallback<O> {
    fn on_event(&self, _event: FileEvent, report: Arc<CoverageReport>) {
        let observer = Arc::clone(&self.observer);
        let handler = Arc::clone(&self.handler);
        self.executor
            .execute(Box::new(move || handler.on_coverage_event(&observer, Some(report))));
    }
}

/// Settings-derived pieces, swapped as a unit by `reconfigure`.
struct Policy {
    config: Arc<Config>,
    locator: CoverageLocator,
    matcher: InclusionMatcher,
}

impl Policy {
    fn new(config: Arc<Config>) -> Result<Self> {
        Ok(Self {
            locator: CoverageLocator::from_config(&config),
            matcher: InclusionMatcher::from_config(&config)?,
            config,
        })
    }

    /// Coverage file for the observer's source, if it is tracked at all.
    fn resolve<O: Observer>(&self, observer: &O) -> Result<Option<PathBuf>> {
        let Some(file_name) = observer.file_name() else {
            debug!("Ignoring observer {} without a file", observer.id());
            return Ok(None);
        };

        if !self.matcher.should_include(&file_name.to_string_lossy()) {
            debug!("Ignoring excluded file '{}'", file_name.display());
            return Ok(None);
        }

        Ok(self
            .locator
            .find(&file_name)?
            .map(|coverage| paths::normalize(&coverage)))
    }
}

pub struct WatcherMediator<O: Observer, F: ReportFactory + Clone = CloverReports> {
    policy: RwLock<Arc<Policy>>,
    handlers: HashMap<FileEvent, Arc<dyn CoverageHandler<O>>>,
    executor: Arc<dyn Executor>,
    factory: F,
    watchers: Mutex<HashMap<PathBuf, CoverageWatcher<F>>>,
}

impl<O: Observer> WatcherMediator<O> {
    /// `handlers` maps watcher events to the handler run for them.
    pub fn new(
        config: Arc<Config>,
        handlers: impl IntoIterator<Item = (FileEvent, Arc<dyn CoverageHandler<O>>)>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        Self::with_factory(config, handlers, executor, CloverReports)
    }
}

impl<O: Observer, F: ReportFactory + Clone> WatcherMediator<O, F> {
    pub fn with_factory(
        config: Arc<Config>,
        handlers: impl IntoIterator<Item = (FileEvent, Arc<dyn CoverageHandler<O>>)>,
        executor: Arc<dyn Executor>,
        factory: F,
    ) -> Result<Self> {
        Ok(Self {
            policy: RwLock::new(Arc::new(Policy::new(config)?)),
            handlers: handlers.into_iter().collect(),
            executor,
            factory,
            watchers: Mutex::new(HashMap::new()),
        })
    }

    fn policy(&self) -> Arc<Policy> {
        Arc::clone(&self.policy.read())
    }

    /// Use `config` for observers added from now on. Running watchers keep
    /// their current settings.
    pub fn reconfigure(&self, config: Arc<Config>) -> Result<()> {
        let policy = Policy::new(config)?;
        *self.policy.write() = Arc::new(policy);
        debug!("Mediator reconfigured");
        Ok(())
    }

    /// Attach `observer` to the watcher for its coverage file, creating and
    /// starting that watcher if needed. Returns the coverage file, or `None`
    /// when the observer is excluded or no report was found.
    pub fn add(&self, observer: Arc<O>) -> Result<Option<PathBuf>> {
        let policy = self.policy();
        let Some(coverage) = policy.resolve(observer.as_ref())? else {
            return Ok(None);
        };

        let mut watchers = self.watchers.lock();
        let watcher = watchers.entry(coverage.clone()).or_insert_with(|| {
            debug!("Creating CoverageWatcher for {}", coverage.display());
            FileWatcher::coverage_with(coverage.clone(), self.factory.clone())
                .with_interval(policy.config.poll_interval)
        });

        for (event, handler) in &self.handlers {
            let callback: Arc<dyn Callback<Arc<CoverageReport>>> = Arc::new(ObserverCallback {
                observer: Arc::clone(&observer),
                handler: Arc::clone(handler),
                executor: Arc::clone(&self.executor),
            });
            watcher.add_callback(&[*event], observer.id(), callback);
        }

        if !watcher.is_running() {
            debug!("Starting CoverageWatcher for {}", coverage.display());
            if let Err(e) = watcher.start() {
                watchers.remove(&coverage);
                return Err(e);
            }
        }

        Ok(Some(coverage))
    }

    /// Drop every registration made for `observer`. Watchers left without
    /// callbacks are stopped (bounded wait) and evicted. Eviction happens
    /// even if a stop times out; the first such failure is returned.
    pub fn remove(&self, observer: &O) -> Result<()> {
        let id = observer.id();
        let timeout = self.policy().config.stop_timeout;
        let mut first_err = None;

        self.watchers.lock().retain(|path, watcher| {
            watcher.remove_callback(id);
            if watcher.has_callbacks() {
                return true;
            }

            debug!("Stopping CoverageWatcher for '{}'", path.display());
            if let Err(e) = watcher.stop(timeout) {
                warn!("{e}");
                first_err.get_or_insert(e);
            }
            false
        });

        first_err.map_or(Ok(()), Err)
    }

    /// Deliver the current report for `observer` right away, as if its
    /// coverage file had just been modified. Observers that are excluded or
    /// have no report get `None` so stale annotations are cleared.
    pub fn refresh(&self, observer: &Arc<O>) -> Result<Option<PathBuf>> {
        let Some(handler) = self.handlers.get(&FileEvent::Modified) else {
            return Ok(None);
        };

        let coverage = self.policy().resolve(observer.as_ref())?;
        let report = coverage
            .as_deref()
            .map(|path| Arc::new(self.factory.create(path)));

        let observer = Arc::clone(observer);
        let handler = Arc::clone(handler);
        self.executor
            .execute(Box::new(move || handler.on_coverage_event(&observer, report)));
        Ok(coverage)
    }

    /// Stop and evict every watcher.
    pub fn shutdown(&self) -> Result<()> {
        let timeout = self.policy().config.stop_timeout;
        let mut first_err = None;

        for (path, mut watcher) in self.watchers.lock().drain() {
            debug!("Stopping CoverageWatcher for '{}'", path.display());
            if let Err(e) = watcher.stop(timeout) {
                warn!("{e}");
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Coverage files currently watched, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.watchers.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Observers registered on the watcher for `coverage` (0 if unwatched).
    pub fn callback_count(&self, coverage: &Path) -> usize {
        self.watchers
            .lock()
            .get(&paths::normalize(coverage))
            .map_or(0, |watcher| watcher.callback_count())
    }

    /// True if the watcher for `coverage` exists and is polling.
    pub fn is_watching(&self, coverage: &Path) -> bool {
        self.watchers
            .lock()
            .get(&paths::normalize(coverage))
            .is_some_and(|watcher| watcher.is_running())
    }
}

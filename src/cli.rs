//! Command handler functions for the covwatch CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout. `watch` is driven through a
//! [`WatchSession`] so the event loop stays in `main`.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use parking_lot::Mutex;

use crate::config::Config;
use crate::executor::TaskQueue;
use crate::locate::CoverageLocator;
use crate::matcher::InclusionMatcher;
use crate::mediator::{CoverageHandler, Observer, WatcherMediator};
use crate::report::CoverageReport;
use crate::view::{line_ranges, HighlightStyle, View, ViewUpdater, BAD_REGIONS, GOOD_REGIONS};
use crate::watch::{FileEvent, ObserverId};

/// When a `watch --duration` run should end. A duration too large to
/// represent means the run has no deadline.
pub fn watch_deadline(start: Instant, duration: Option<f64>) -> Result<Option<Instant>> {
    let Some(secs) = duration else {
        return Ok(None);
    };
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("--duration must be a non-negative number, got {secs}");
    }
    Ok(Duration::try_from_secs_f64(secs)
        .ok()
        .and_then(|d| start.checked_add(d)))
}

/// A [`View`] that keeps annotations in memory and renders them as text.
#[derive(Debug, Default, Clone)]
pub struct TerminalView {
    good: Vec<u32>,
    bad: Vec<u32>,
    status: Option<String>,
}

impl TerminalView {
    pub fn is_empty(&self) -> bool {
        self.good.is_empty() && self.bad.is_empty() && self.status.is_none()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn covered_lines(&self) -> &[u32] {
        &self.good
    }

    pub fn uncovered_lines(&self) -> &[u32] {
        &self.bad
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.status {
            Some(status) => writeln!(out, "  {status}").unwrap(),
            None => writeln!(out, "  No coverage data").unwrap(),
        }
        if !self.good.is_empty() {
            writeln!(out, "  Covered:   {}", line_ranges(&self.good)).unwrap();
        }
        if !self.bad.is_empty() {
            writeln!(out, "  Uncovered: {}", line_ranges(&self.bad)).unwrap();
        }
        out
    }
}

impl View for TerminalView {
    fn add_regions(&mut self, key: &str, lines: &[u32], _style: HighlightStyle) {
        match key {
            GOOD_REGIONS => self.good = lines.to_vec(),
            BAD_REGIONS => self.bad = lines.to_vec(),
            _ => {}
        }
    }

    fn erase_regions(&mut self, key: &str) {
        match key {
            GOOD_REGIONS => self.good.clear(),
            BAD_REGIONS => self.bad.clear(),
            _ => {}
        }
    }

    fn set_status(&mut self, _key: &str, text: &str) {
        self.status = Some(text.to_string());
    }

    fn erase_status(&mut self, _key: &str) {
        self.status = None;
    }
}

pub fn cmd_find(config: &Config, source: &Path) -> Result<String> {
    let locator = CoverageLocator::from_config(config);
    match locator.find(source)? {
        Some(report) => Ok(format!("{}\n", report.display())),
        None => Ok(format!(
            "No '{}' found above '{}'\n",
            locator.report_path().display(),
            source.display()
        )),
    }
}

pub fn cmd_show(config: &Config, source: &Path) -> Result<String> {
    let matcher = InclusionMatcher::from_config(config)?;
    if !matcher.should_include(&source.to_string_lossy()) {
        return Ok(format!(
            "'{}' is excluded by the include/exclude patterns\n",
            source.display()
        ));
    }

    let locator = CoverageLocator::from_config(config);
    let Some(report_path) = locator.find(source)? else {
        return Ok(format!("No coverage report found for '{}'\n", source.display()));
    };

    let report = CoverageReport::new(&report_path);
    if report.get_file(source)?.is_none() {
        return Ok(format!(
            "No coverage data for '{}' in {}\n",
            source.display(),
            report_path.display()
        ));
    }

    let mut view = TerminalView::default();
    ViewUpdater::default()
        .update_from_report(&mut view, Some(&report), source)
        .with_context(|| format!("Failed to read coverage for '{}'", source.display()))?;

    let mut out = String::new();
    writeln!(out, "{}", source.display()).unwrap();
    writeln!(out, "  Report: {}", report_path.display()).unwrap();
    out.push_str(&view.render());
    Ok(out)
}

/// A source file followed by `watch`.
pub struct WatchTarget {
    id: ObserverId,
    source: PathBuf,
}

impl WatchTarget {
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl Observer for WatchTarget {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn file_name(&self) -> Option<PathBuf> {
        Some(self.source.clone())
    }
}

/// Rendered coverage for one target, stamped with the local time.
pub fn event_line(source: &Path, view: &TerminalView) -> String {
    let mut out = format!(
        "[{}] {}\n",
        Local::now().format("%H:%M:%S"),
        source.display()
    );
    out.push_str(&view.render());
    out
}

/// Watches a set of sources, running their callbacks on the caller's thread
/// through [`WatchSession::step`].
pub struct WatchSession {
    queue: TaskQueue,
    mediator: WatcherMediator<WatchTarget>,
    targets: Mutex<Vec<Arc<WatchTarget>>>,
    output: Arc<Mutex<Vec<String>>>,
    next_id: AtomicU64,
}

impl WatchSession {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let queue = TaskQueue::default();
        let output = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&output);
        let updater = ViewUpdater::default();
        let handler: Arc<dyn CoverageHandler<WatchTarget>> = Arc::new(
            move |target: &WatchTarget, report: Option<Arc<CoverageReport>>| {
                let mut view = TerminalView::default();
                let line = match updater.update_from_report(&mut view, report.as_deref(), &target.source) {
                    Ok(()) => event_line(&target.source, &view),
                    Err(e) => format!("{}: {e}\n", target.source.display()),
                };
                sink.lock().push(line);
            },
        );

        let handlers = [FileEvent::Created, FileEvent::Modified, FileEvent::Deleted]
            .into_iter()
            .map(|event| (event, Arc::clone(&handler)));
        let mediator = WatcherMediator::new(config, handlers, Arc::new(queue.executor()))?;

        Ok(Self {
            queue,
            mediator,
            targets: Mutex::new(Vec::new()),
            output,
            next_id: AtomicU64::new(1),
        })
    }

    /// Start following `source` and queue its current coverage.
    pub fn add(&self, source: &Path) -> Result<String> {
        let target = Arc::new(WatchTarget {
            id: ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            source: source.to_path_buf(),
        });

        let Some(report) = self.mediator.add(Arc::clone(&target))? else {
            return Ok(format!("Not watching '{}': no coverage report\n", source.display()));
        };
        self.targets.lock().push(Arc::clone(&target));
        self.mediator.refresh(&target)?;
        Ok(format!("Watching {} for '{}'\n", report.display(), source.display()))
    }

    /// Wait up to `timeout` for callbacks, run everything queued and return
    /// what they produced.
    pub fn step(&self, timeout: Duration) -> Vec<String> {
        if self.queue.run_next(timeout) {
            self.queue.run_pending();
        }
        std::mem::take(&mut *self.output.lock())
    }

    pub fn watched_reports(&self) -> Vec<PathBuf> {
        self.mediator.watched_paths()
    }

    /// Detach every target, stopping their watchers.
    pub fn shutdown(&self) -> Result<()> {
        let targets = std::mem::take(&mut *self.targets.lock());
        let mut first_err = None;
        for target in &targets {
            if let Err(e) = self.mediator.remove(target) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

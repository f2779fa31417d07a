//! Watcher specialization that hands callbacks a freshly built coverage
//! report for the watched file.
//!
//! The report is constructed per dispatch and only parsed when a callback
//! asks it for data, so polls that detect nothing never touch the XML.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::file::FileWatcher;
use super::{Dispatch, FileEvent};
use crate::report::{CloverReports, CoverageReport, ReportFactory};

pub struct CoverageDispatch<F: ReportFactory = CloverReports> {
    factory: F,
}

impl<F: ReportFactory> CoverageDispatch<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: ReportFactory> Dispatch for CoverageDispatch<F> {
    type Payload = Arc<CoverageReport>;

    fn payload(&self, path: &Path, _event: FileEvent) -> Arc<CoverageReport> {
        Arc::new(self.factory.create(path))
    }
}

/// Watches a coverage report and passes a [`CoverageReport`] to callbacks.
pub type CoverageWatcher<F = CloverReports> = FileWatcher<CoverageDispatch<F>>;

impl FileWatcher<CoverageDispatch> {
    pub fn coverage(path: impl Into<PathBuf>) -> Self {
        Self::coverage_with(path, CloverReports)
    }
}

impl<F: ReportFactory> FileWatcher<CoverageDispatch<F>> {
    pub fn coverage_with(path: impl Into<PathBuf>, factory: F) -> Self {
        Self::with_dispatch(path, CoverageDispatch::new(factory))
    }
}

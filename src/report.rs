//! A single Clover report file, loaded on first use.
//!
//! Each watcher event produces a fresh `CoverageReport`; nothing is kept
//! across polls. Within one instance the file list is read at most once and
//! every lookup (hit or miss) is cached by normalized source path.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::model::{FileCoverage, FileFragment};
use crate::parsers::clover::CloverParser;
use crate::parsers::Parser;
use crate::paths;

struct Entry {
    normalized: PathBuf,
    fragment: FileFragment,
}

pub struct CoverageReport {
    path: PathBuf,
    entries: OnceCell<Vec<Entry>>,
    files: Mutex<HashMap<PathBuf, Option<Arc<FileCoverage>>>>,
}

impl CoverageReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: OnceCell::new(),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the backing report file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.entries.get().is_some()
    }

    /// Read the report's file list if that has not happened yet. A report
    /// file that does not exist loads as an empty report.
    pub fn load(&self) -> Result<()> {
        self.entries()?;
        Ok(())
    }

    /// Number of `<file>` entries in the report.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Coverage for `source`, or `None` when the report has no entry for it.
    pub fn get_file(&self, source: &Path) -> Result<Option<Arc<FileCoverage>>> {
        let entries = self.entries()?;
        let key = paths::normalize(source);

        let mut files = self.files.lock();
        if let Some(cached) = files.get(&key) {
            return Ok(cached.clone());
        }

        // Later entries win when a report lists the same file twice.
        let found = entries
            .iter()
            .rev()
            .find(|entry| entry.normalized == key)
            .map(|entry| Arc::new(FileCoverage::new(key.clone(), entry.fragment.clone())));

        if found.is_none() {
            debug!("No coverage for {} in {}", key.display(), self.path.display());
        }
        files.insert(key, found.clone());
        Ok(found)
    }

    /// True once `source` has been looked up on this instance.
    pub fn is_cached(&self, source: &Path) -> bool {
        self.files.lock().contains_key(&paths::normalize(source))
    }

    fn entries(&self) -> Result<&Vec<Entry>> {
        self.entries.get_or_try_init(|| read_entries(&self.path))
    }
}

impl std::fmt::Debug for CoverageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageReport")
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

fn read_entries(path: &Path) -> Result<Vec<Entry>> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Report {} does not exist, treating as empty", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let fragments = CloverParser.parse(&content)?;
    debug!("Loaded {} file entries from {}", fragments.len(), path.display());

    Ok(fragments
        .into_iter()
        .map(|fragment| Entry {
            normalized: paths::normalize(Path::new(&fragment.name)),
            fragment,
        })
        .collect())
}

/// Builds the report handed to coverage watcher callbacks.
pub trait ReportFactory: Send + Sync + 'static {
    fn create(&self, path: &Path) -> CoverageReport;
}

/// Default factory: a lazily loaded Clover report.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloverReports;

impl ReportFactory for CloverReports {
    fn create(&self, path: &Path) -> CoverageReport {
        CoverageReport::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/test.xml")
    }

    #[test]
    fn test_not_loaded_until_used() {
        let report = CoverageReport::new(fixture());
        assert!(!report.is_loaded());
        report.load().unwrap();
        assert!(report.is_loaded());
        assert_eq!(report.len().unwrap(), 2);
    }

    #[test]
    fn test_missing_report_is_empty() {
        let report = CoverageReport::new("/path/to/nonexistent/coverage.xml");
        report.load().unwrap();
        assert!(report.is_loaded());
        assert!(report.is_empty().unwrap());
        assert!(report.get_file(Path::new("/path/to/file.php")).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_get_file_implicit_load() {
        let report = CoverageReport::new(fixture());
        let coverage = report.get_file(Path::new("/path/to/file.php")).unwrap();
        assert!(coverage.is_some());
        assert!(report.is_loaded());
    }

    #[cfg(unix)]
    #[test]
    fn test_get_file_normalizes_lookup() {
        let report = CoverageReport::new(fixture());
        let coverage = report
            .get_file(Path::new("/path/to/lib/../file.php"))
            .unwrap()
            .unwrap();
        assert_eq!(coverage.path(), Path::new("/path/to/file.php"));
    }

    #[cfg(unix)]
    #[test]
    fn test_get_file_is_cached() {
        let report = CoverageReport::new(fixture());
        let first = report.get_file(Path::new("/path/to/file.php")).unwrap().unwrap();
        let second = report.get_file(Path::new("/path/to/./file.php")).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_misses_are_cached() {
        let report = CoverageReport::new(fixture());
        let missing = Path::new("/path/to/nonexistent/file.php");
        assert!(!report.is_cached(missing));
        assert!(report.get_file(missing).unwrap().is_none());
        assert!(report.is_cached(missing));
    }
}

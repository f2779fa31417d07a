//! Per-file coverage data as extracted from a Clover report.
//!
//! The parser keeps each `<file>` element as a raw [`FileFragment`]. A
//! [`FileCoverage`] wraps one fragment and classifies its lines on first
//! access; until then it stays unparsed.

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::error::{CovwatchError, Result};

/// Line type that takes part in covered/uncovered classification.
pub const STATEMENT: &str = "stmt";

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// A `<line>` element, attributes kept verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLine {
    pub kind: Option<String>,
    pub num: Option<String>,
    pub count: Option<String>,
}

/// The `<metrics>` element that is a direct child of `<file>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetrics {
    pub loc: Option<String>,
    pub statements: Option<String>,
    pub covered_statements: Option<String>,
}

/// Unparsed report data for a single source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFragment {
    /// Source path as written in the report.
    pub name: String,
    pub metrics: Option<RawMetrics>,
    pub lines: Vec<RawLine>,
}

/// Classified lines of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineClassification {
    /// Lines of code reported for the file (`loc`).
    pub num_lines: u32,
    /// Covered statements (`coveredstatements`).
    pub covered: u64,
    /// Total statements (`statements`).
    pub statements: u64,
    /// Statement lines hit at least once, ascending.
    pub good_lines: Vec<u32>,
    /// Statement lines never hit, ascending.
    pub bad_lines: Vec<u32>,
}

impl LineClassification {
    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        CoverageSummary {
            covered: self.covered,
            statements: self.statements,
        }
    }
}

/// Statement totals for a file, rendered as `"3/4 lines (75.00%)"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageSummary {
    pub covered: u64,
    pub statements: u64,
}

impl CoverageSummary {
    #[must_use]
    pub fn rate(&self) -> f64 {
        rate(self.covered, self.statements)
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.rate() * 100.0
    }
}

impl fmt::Display for CoverageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} lines ({:.2}%)",
            self.covered,
            self.statements,
            self.percentage()
        )
    }
}

/// Coverage for a single source file, parsed lazily from its fragment.
#[derive(Debug)]
pub struct FileCoverage {
    path: PathBuf,
    fragment: FileFragment,
    parsed: OnceCell<LineClassification>,
}

impl FileCoverage {
    pub fn new(path: PathBuf, fragment: FileFragment) -> Self {
        Self {
            path,
            fragment,
            parsed: OnceCell::new(),
        }
    }

    /// Normalized source path this entry was looked up by.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fragment(&self) -> &FileFragment {
        &self.fragment
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed.get().is_some()
    }

    /// Classify the fragment's lines, once. Later calls return the cached
    /// result. A failed parse is not cached and is reported again.
    pub fn ensure_parsed(&self) -> Result<&LineClassification> {
        self.parsed.get_or_try_init(|| classify(&self.fragment))
    }

    pub fn num_lines(&self) -> Result<u32> {
        Ok(self.ensure_parsed()?.num_lines)
    }

    pub fn covered(&self) -> Result<u64> {
        Ok(self.ensure_parsed()?.covered)
    }

    pub fn statements(&self) -> Result<u64> {
        Ok(self.ensure_parsed()?.statements)
    }

    pub fn good_lines(&self) -> Result<&[u32]> {
        Ok(&self.ensure_parsed()?.good_lines)
    }

    pub fn bad_lines(&self) -> Result<&[u32]> {
        Ok(&self.ensure_parsed()?.bad_lines)
    }

    pub fn summary(&self) -> Result<CoverageSummary> {
        Ok(self.ensure_parsed()?.summary())
    }
}

fn classify(fragment: &FileFragment) -> Result<LineClassification> {
    let metrics = fragment.metrics.as_ref().ok_or_else(|| {
        CovwatchError::Parse(format!("file '{}' has no <metrics> element", fragment.name))
    })?;

    let num_lines: u32 = number(&fragment.name, "loc", metrics.loc.as_deref())?;
    let covered: u64 = number(
        &fragment.name,
        "coveredstatements",
        metrics.covered_statements.as_deref(),
    )?;
    let statements: u64 = number(&fragment.name, "statements", metrics.statements.as_deref())?;

    let mut good_lines = Vec::new();
    let mut bad_lines = Vec::new();

    for line in &fragment.lines {
        if line.kind.as_deref() != Some(STATEMENT) {
            continue;
        }

        let line_number: u32 = number(&fragment.name, "num", line.num.as_deref())?;
        let count: u64 = number(&fragment.name, "count", line.count.as_deref())?;

        // Reports carry a line 0 and lines past the end of the file; neither
        // can be shown.
        if line_number == 0 || line_number > num_lines {
            continue;
        }

        if count > 0 {
            good_lines.push(line_number);
        } else {
            bad_lines.push(line_number);
        }
    }

    good_lines.sort_unstable();
    good_lines.dedup();
    bad_lines.sort_unstable();
    bad_lines.dedup();

    Ok(LineClassification {
        num_lines,
        covered,
        statements,
        good_lines,
        bad_lines,
    })
}

fn number<T: std::str::FromStr>(file: &str, attr: &str, value: Option<&str>) -> Result<T> {
    let value = value.ok_or_else(|| {
        CovwatchError::Parse(format!("file '{file}': missing '{attr}' attribute"))
    })?;
    value.trim().parse().map_err(|_| {
        CovwatchError::Parse(format!("file '{file}': '{attr}' is not a valid number: '{value}'"))
    })
}

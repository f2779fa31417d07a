//! Projects a file's line classification onto an editor view: highlight
//! regions for covered and uncovered lines plus a status summary.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::model::FileCoverage;
use crate::report::CoverageReport;

/// Region key for covered lines.
pub const GOOD_REGIONS: &str = "CovwatchGood";
/// Region key for uncovered lines.
pub const BAD_REGIONS: &str = "CovwatchBad";
/// Status key for the percentage summary.
pub const STATUS_KEY: &str = "CovwatchPercentage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightStyle {
    pub scope: &'static str,
    pub icon: &'static str,
}

pub const COVERED_STYLE: HighlightStyle = HighlightStyle {
    scope: "markup.inserted",
    icon: "dot",
};

pub const UNCOVERED_STYLE: HighlightStyle = HighlightStyle {
    scope: "markup.deleted",
    icon: "bookmark",
};

/// Editor surface the updater draws on. Line numbers are 1-based.
pub trait View {
    fn add_regions(&mut self, key: &str, lines: &[u32], style: HighlightStyle);
    fn erase_regions(&mut self, key: &str);
    fn set_status(&mut self, key: &str, text: &str);
    fn erase_status(&mut self, key: &str);
}

#[derive(Debug, Clone, Copy)]
pub struct ViewUpdater {
    pub covered: HighlightStyle,
    pub uncovered: HighlightStyle,
}

impl Default for ViewUpdater {
    fn default() -> Self {
        Self {
            covered: COVERED_STYLE,
            uncovered: UNCOVERED_STYLE,
        }
    }
}

impl ViewUpdater {
    /// Replace the view's annotations with those for `coverage`. `None`
    /// only clears. If the coverage data cannot be parsed the view is left
    /// cleared and the error returned.
    pub fn update<V: View + ?Sized>(
        &self,
        view: &mut V,
        coverage: Option<&FileCoverage>,
    ) -> Result<()> {
        self.remove(view);
        let Some(coverage) = coverage else {
            return Ok(());
        };

        if let Err(e) = self.annotate(view, coverage) {
            self.remove(view);
            return Err(e);
        }
        Ok(())
    }

    /// Look `source` up in `report` and update the view with the result.
    /// A missing report or a source absent from it clears the view.
    pub fn update_from_report<V: View + ?Sized>(
        &self,
        view: &mut V,
        report: Option<&CoverageReport>,
        source: &Path,
    ) -> Result<()> {
        let coverage = match report {
            Some(report) => match report.get_file(source) {
                Ok(coverage) => coverage,
                Err(e) => {
                    self.remove(view);
                    return Err(e);
                }
            },
            None => None,
        };
        self.update(view, coverage.as_deref())
    }

    fn annotate<V: View + ?Sized>(&self, view: &mut V, coverage: &FileCoverage) -> Result<()> {
        let parsed = coverage.ensure_parsed()?;

        if !parsed.good_lines.is_empty() {
            view.add_regions(GOOD_REGIONS, &parsed.good_lines, self.covered);
        }
        if !parsed.bad_lines.is_empty() {
            view.add_regions(BAD_REGIONS, &parsed.bad_lines, self.uncovered);
        }

        let status = format!("Code coverage: {}", parsed.summary());
        debug!("{status}");
        view.set_status(STATUS_KEY, &status);
        Ok(())
    }

    /// Erase everything this updater may have drawn.
    pub fn remove<V: View + ?Sized>(&self, view: &mut V) {
        view.erase_regions(BAD_REGIONS);
        view.erase_regions(GOOD_REGIONS);
        view.erase_status(STATUS_KEY);
    }
}

/// Compress sorted line numbers into range notation, e.g. "1-3, 7".
#[must_use]
pub fn line_ranges(lines: &[u32]) -> String {
    let Some((&first, rest)) = lines.split_first() else {
        return String::new();
    };

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    let (mut start, mut end) = (first, first);
    for &line in rest {
        if line == end + 1 {
            end = line;
        } else {
            ranges.push((start, end));
            start = line;
            end = line;
        }
    }
    ranges.push((start, end));

    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileFragment, RawLine, RawMetrics, STATEMENT};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[derive(Default)]
    struct RecordingView {
        regions: BTreeMap<String, (Vec<u32>, HighlightStyle)>,
        status: BTreeMap<String, String>,
    }

    impl View for RecordingView {
        fn add_regions(&mut self, key: &str, lines: &[u32], style: HighlightStyle) {
            self.regions.insert(key.to_string(), (lines.to_vec(), style));
        }

        fn erase_regions(&mut self, key: &str) {
            self.regions.remove(key);
        }

        fn set_status(&mut self, key: &str, text: &str) {
            self.status.insert(key.to_string(), text.to_string());
        }

        fn erase_status(&mut self, key: &str) {
            self.status.remove(key);
        }
    }

    fn stmt(num: &str, count: &str) -> RawLine {
        RawLine {
            kind: Some(STATEMENT.to_string()),
            num: Some(num.to_string()),
            count: Some(count.to_string()),
        }
    }

    fn coverage(lines: Vec<RawLine>, statements: &str, covered: &str) -> FileCoverage {
        FileCoverage::new(
            PathBuf::from("/src/a.php"),
            FileFragment {
                name: "/src/a.php".to_string(),
                metrics: Some(RawMetrics {
                    loc: Some("20".to_string()),
                    statements: Some(statements.to_string()),
                    covered_statements: Some(covered.to_string()),
                }),
                lines,
            },
        )
    }

    #[test]
    fn test_update_annotates_both_sets() {
        let fc = coverage(vec![stmt("3", "1"), stmt("4", "2"), stmt("9", "0")], "3", "2");
        let mut view = RecordingView::default();
        ViewUpdater::default().update(&mut view, Some(&fc)).unwrap();

        assert_eq!(view.regions[GOOD_REGIONS], (vec![3, 4], COVERED_STYLE));
        assert_eq!(view.regions[BAD_REGIONS], (vec![9], UNCOVERED_STYLE));
        assert_eq!(view.status[STATUS_KEY], "Code coverage: 2/3 lines (66.67%)");
    }

    #[test]
    fn test_update_skips_empty_sets() {
        let fc = coverage(
            vec![stmt("12", "0"), stmt("13", "0"), stmt("14", "0"), stmt("15", "0")],
            "4",
            "0",
        );
        let mut view = RecordingView::default();
        view.add_regions(GOOD_REGIONS, &[1], COVERED_STYLE);
        ViewUpdater::default().update(&mut view, Some(&fc)).unwrap();

        assert!(!view.regions.contains_key(GOOD_REGIONS));
        assert_eq!(view.regions[BAD_REGIONS].0, vec![12, 13, 14, 15]);
        assert_eq!(view.status[STATUS_KEY], "Code coverage: 0/4 lines (0.00%)");
    }

    #[test]
    fn test_update_none_clears() {
        let mut view = RecordingView::default();
        view.add_regions(BAD_REGIONS, &[1], UNCOVERED_STYLE);
        view.set_status(STATUS_KEY, "stale");

        ViewUpdater::default().update(&mut view, None).unwrap();
        assert!(view.regions.is_empty());
        assert!(view.status.is_empty());
    }

    #[test]
    fn test_parse_error_leaves_view_cleared() {
        let fc = coverage(vec![stmt("3", "1")], "three", "1");
        let mut view = RecordingView::default();
        view.set_status(STATUS_KEY, "stale");

        assert!(ViewUpdater::default().update(&mut view, Some(&fc)).is_err());
        assert!(view.regions.is_empty());
        assert!(view.status.is_empty());
    }

    #[test]
    fn test_line_ranges() {
        assert_eq!(line_ranges(&[]), "");
        assert_eq!(line_ranges(&[5]), "5");
        assert_eq!(line_ranges(&[1, 2, 3, 7]), "1-3, 7");
        assert_eq!(line_ranges(&[1, 3, 4, 5, 8, 9]), "1, 3-5, 8-9");
    }
}

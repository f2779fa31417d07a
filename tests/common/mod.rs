#![allow(dead_code)]

use std::fmt::Write;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

pub const REPORT: &str = "build/logs/clover.xml";

/// A temporary project tree with sources and a Clover report at the default
/// location. The directory is removed when this is dropped.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn report_path(&self) -> PathBuf {
        self.root().join(REPORT)
    }

    /// Create `rel` (and its parents) with some placeholder content.
    pub fn source(&self, rel: &str) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_atomic(&path, "<?php\n");
        path
    }

    pub fn write_report(&self, xml: &str) -> PathBuf {
        let path = self.report_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_atomic(&path, xml);
        path
    }

    pub fn remove_report(&self) {
        fs::remove_file(self.report_path()).unwrap();
    }
}

/// Minimal Clover document covering one source file. Every listed line is a
/// statement; `loc` leaves room past the highest line.
pub fn clover_for(source: &Path, good: &[u32], bad: &[u32]) -> String {
    let loc = good.iter().chain(bad).max().copied().unwrap_or(0) + 1;
    let statements = good.len() + bad.len();

    let mut xml = String::new();
    writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#).unwrap();
    writeln!(xml, r#"<coverage generated="1"><project timestamp="1">"#).unwrap();
    writeln!(xml, r#"<file name="{}">"#, source.display()).unwrap();
    for num in good {
        writeln!(xml, r#"<line num="{num}" type="stmt" count="1"/>"#).unwrap();
    }
    for num in bad {
        writeln!(xml, r#"<line num="{num}" type="stmt" count="0"/>"#).unwrap();
    }
    writeln!(
        xml,
        r#"<metrics loc="{loc}" ncloc="{loc}" statements="{statements}" coveredstatements="{}"/>"#,
        good.len()
    )
    .unwrap();
    writeln!(xml, "</file></project></coverage>").unwrap();
    xml
}

/// Write through a temporary file and rename it into place, so a poller
/// never sees a half-written file.
pub fn write_atomic(path: &Path, contents: &str) {
    let tmp = path.with_extension("partial");
    fs::write(&tmp, contents).unwrap();
    fs::rename(&tmp, path).unwrap();
}

/// Like [`write_atomic`], but the new file's mtime is `secs` past the old
/// one's, so the change is visible regardless of timestamp granularity.
pub fn write_atomic_bumped(path: &Path, contents: &str, secs: u64) {
    let base = fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| SystemTime::now());
    let tmp = path.with_extension("partial");
    fs::write(&tmp, contents).unwrap();
    let file = OpenOptions::new().write(true).open(&tmp).unwrap();
    file.set_modified(base + Duration::from_secs(secs)).unwrap();
    drop(file);
    fs::rename(&tmp, path).unwrap();
}

/// Move a file's mtime forward so the next poll sees a change even when the
/// write landed within the filesystem's timestamp granularity.
pub fn bump_mtime(path: &Path, secs: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    let mtime = file.metadata().unwrap().modified().unwrap();
    file.set_modified(mtime + Duration::from_secs(secs)).unwrap();
}

pub const WAIT: Duration = Duration::from_secs(5);
pub const TICK: Duration = Duration::from_millis(10);

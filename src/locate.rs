//! Finds the coverage report that belongs to a source file by walking up
//! its ancestor directories.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::paths;

#[derive(Debug, Clone)]
pub struct CoverageLocator {
    /// Report path relative to a project root.
    report_path: PathBuf,
}

impl CoverageLocator {
    pub fn new(report_path: impl AsRef<Path>) -> Self {
        Self {
            report_path: paths::lexical_normalize(report_path.as_ref()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.report_path)
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Probe `<ancestor>/<report_path>` for each ancestor of `source`,
    /// nearest first. Results are not cached.
    pub fn find(&self, source: &Path) -> Result<Option<PathBuf>> {
        let source = if source.is_absolute() {
            source.to_path_buf()
        } else {
            std::env::current_dir()?.join(source)
        };
        let source = paths::lexical_normalize(&source);

        for dir in source.ancestors().skip(1) {
            let candidate = dir.join(&self.report_path);
            if candidate.is_file() {
                debug!("Coverage for {} in {}", source.display(), candidate.display());
                return Ok(Some(candidate));
            }
        }

        debug!("Coverage file not found for {}", source.display());
        Ok(None)
    }
}

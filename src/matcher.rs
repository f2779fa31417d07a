//! Include/exclude filtering of source paths.
//!
//! Patterns are searched for anywhere in the path (not anchored). An empty
//! include list includes nothing.

use regex::Regex;

use crate::config::Config;
use crate::error::{CovwatchError, Result};

#[derive(Debug, Clone)]
pub struct InclusionMatcher {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl InclusionMatcher {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.include, &config.exclude)
    }

    /// Track `path` only if it is included and not excluded.
    pub fn should_include(&self, path: &str) -> bool {
        self.included(path) && !self.excluded(path)
    }

    pub fn included(&self, path: &str) -> bool {
        matches(&self.include, path)
    }

    pub fn excluded(&self, path: &str) -> bool {
        matches(&self.exclude, path)
    }
}

/// True if any pattern matches somewhere in `s`.
pub fn matches(patterns: &[Regex], s: &str) -> bool {
    patterns.iter().any(|re| re.is_match(s))
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            let pattern = p.as_ref();
            Regex::new(pattern).map_err(|source| CovwatchError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect()
}

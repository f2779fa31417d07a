use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovwatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error at position {position}: {source}")]
    Xml {
        source: quick_xml::Error,
        position: usize,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// A watcher's polling thread did not terminate within the bound given
    /// to `stop`. The thread has been signalled; calling `stop` again waits
    /// for it once more.
    #[error("Timed out after {timeout:?} waiting for watcher on {} to stop", path.display())]
    StopTimeout { path: PathBuf, timeout: Duration },

    #[error("Watcher has already been stopped and cannot be restarted")]
    WatcherStopped,
}

impl CovwatchError {
    /// True for the stop-timeout condition, which callers may want to retry
    /// with a longer bound.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CovwatchError::StopTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, CovwatchError>;

//! Settings consumed by the locator, matcher and watchers.
//!
//! A `Config` is an immutable value. Reloading means building a new one and
//! swapping it into a [`ConfigStore`]; nothing mutates a config in place.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CovwatchError, Result};

pub const DEFAULT_REPORT_PATH: &str = "build/logs/clover.xml";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Report location relative to a project root, e.g. `build/logs/clover.xml`.
    pub report_path: String,
    /// Regexes a source path must match (any of) to be tracked.
    pub include: Vec<String>,
    /// Regexes that veto an included path (any of).
    pub exclude: Vec<String>,
    pub poll_interval: Duration,
    /// Bounded wait used when a watcher with no observers left is stopped.
    pub stop_timeout: Duration,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_path: DEFAULT_REPORT_PATH.to_string(),
            include: vec![r"\.php$".to_string()],
            exclude: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            debug: false,
        }
    }
}

/// One layer of settings as written in a settings file. Every key is
/// optional; absent keys fall through to the layer below.
#[derive(Debug, Default, Deserialize)]
struct Layer {
    report_path: Option<String>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    /// Seconds.
    poll_interval: Option<f64>,
    /// Seconds.
    stop_timeout: Option<f64>,
    debug: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(flatten)]
    global: Layer,
    /// Project-level overrides.
    #[serde(default, rename = "phpcoverage")]
    project: Option<Layer>,
}

impl Config {
    /// Parse a JSON settings document. Keys inside the `phpcoverage` object
    /// take precedence over top-level keys.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: SettingsFile = serde_json::from_str(text)
            .map_err(|e| CovwatchError::Config(format!("invalid settings: {e}")))?;

        let mut config = Config::default().apply(file.global)?;
        if let Some(project) = file.project {
            debug!("[config] applying project overrides");
            config = config.apply(project)?;
        }
        Ok(config)
    }

    /// Read and parse a settings file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("[config] loading {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn apply(mut self, layer: Layer) -> Result<Self> {
        if let Some(report_path) = layer.report_path {
            if report_path.trim().is_empty() {
                return Err(CovwatchError::Config("report_path must not be empty".into()));
            }
            self.report_path = report_path;
        }
        if let Some(include) = layer.include {
            self.include = include;
        }
        if let Some(exclude) = layer.exclude {
            self.exclude = exclude;
        }
        if let Some(secs) = layer.poll_interval {
            self.poll_interval = seconds("poll_interval", secs)?;
        }
        if let Some(secs) = layer.stop_timeout {
            self.stop_timeout = seconds("stop_timeout", secs)?;
        }
        if let Some(debug) = layer.debug {
            self.debug = debug;
        }
        Ok(self)
    }
}

/// Convert a seconds value from a settings file. Values too large for a
/// `Duration`, or too small to survive rounding to nanoseconds, are rejected.
fn seconds(key: &str, secs: f64) -> Result<Duration> {
    let invalid = || {
        CovwatchError::Config(format!(
            "{key} must be a positive number of seconds, got {secs}"
        ))
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid());
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(invalid()),
    }
}

/// Holder for the current configuration. Readers take a snapshot with
/// `current()`; `replace` swaps the whole value at once.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<Config> {
        Arc::clone(&self.inner.read())
    }

    /// Install a new configuration, returning the one it replaced.
    pub fn replace(&self, config: Config) -> Arc<Config> {
        let mut guard = self.inner.write();
        std::mem::replace(&mut *guard, Arc::new(config))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.report_path, "build/logs/clover.xml");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_project_overrides_global() {
        let config = Config::from_json(
            r#"{
                "report_path": "global.xml",
                "include": ["\\.php$"],
                "debug": false,
                "phpcoverage": { "report_path": "project.xml", "debug": true }
            }"#,
        )
        .unwrap();
        assert_eq!(config.report_path, "project.xml");
        assert!(config.debug);
        assert_eq!(config.include, vec![r"\.php$".to_string()]);
    }

    #[test]
    fn test_poll_interval_seconds() {
        let config = Config::from_json(r#"{ "poll_interval": 0.25 }"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        let err = Config::from_json(r#"{ "poll_interval": 0 }"#).unwrap_err();
        assert!(matches!(err, CovwatchError::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_seconds() {
        for json in [
            r#"{ "poll_interval": 1e20 }"#,
            r#"{ "stop_timeout": 1e300 }"#,
            r#"{ "poll_interval": 1e-12 }"#,
        ] {
            let err = Config::from_json(json).unwrap_err();
            assert!(matches!(err, CovwatchError::Config(_)), "{json}: {err}");
        }

        let config = Config::from_json(r#"{ "poll_interval": 0.001 }"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = Config::from_json(r#"{ "report_path": "#).unwrap_err();
        assert!(matches!(err, CovwatchError::Config(_)));
    }

    #[test]
    fn test_store_replace_swaps_snapshot() {
        let store = ConfigStore::default();
        let before = store.current();

        let mut next = Config::default();
        next.report_path = "other/clover.xml".into();
        let old = store.replace(next);

        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(before.report_path, DEFAULT_REPORT_PATH);
        assert_eq!(store.current().report_path, "other/clover.xml");
    }
}

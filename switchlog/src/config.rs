//! Run configuration.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::TemplateError;
use crate::history::{Baseline, DEFAULT_MAX_KEEP, JsonLinesPersistence};
use crate::template::{DEFAULT_PLATFORM, TemplateMatcher};

/// Directory used for history when none is configured.
pub const DEFAULT_HISTORY_DIR: &str = "history";

/// Settings for one collection run and its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    device_id: Option<String>,
    platform: String,
    templates_dir: Option<PathBuf>,
    history_dir: PathBuf,
    max_keep: Option<usize>,
    baseline: Baseline,
    timestamp: Option<DateTime<Utc>>,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }

    /// Device id override; `None` means take it from the capture.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn templates_dir(&self) -> Option<&Path> {
        self.templates_dir.as_deref()
    }

    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    pub fn max_keep(&self) -> Option<usize> {
        self.max_keep
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    /// Collection time: the override if set, else now.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }

    /// Matcher over the built-in templates, with the template directory
    /// layered on top when one is configured.
    pub fn matcher(&self) -> Result<TemplateMatcher, TemplateError> {
        let matcher = TemplateMatcher::builtin()?;
        match &self.templates_dir {
            Some(dir) => matcher.with_directory(dir),
            None => Ok(matcher),
        }
    }

    /// History persistence for the configured directory and retention.
    pub fn persistence(&self) -> JsonLinesPersistence {
        JsonLinesPersistence::new(&self.history_dir).with_max_keep(self.max_keep)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfigBuilder::new().build()
    }
}

/// Builder for [`RunConfig`].
///
/// # Example
///
/// ```rust
/// use switchlog::config::RunConfig;
/// use switchlog::history::Baseline;
///
/// let config = RunConfig::builder()
///     .device_id("core-sw1")
///     .history_dir("/var/lib/switchlog")
///     .max_keep(Some(30))
///     .baseline(Baseline::Oldest)
///     .build();
///
/// assert_eq!(config.platform(), "cisco_ios");
/// assert_eq!(config.device_id(), Some("core-sw1"));
/// ```
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    device_id: Option<String>,
    platform: String,
    templates_dir: Option<PathBuf>,
    history_dir: PathBuf,
    max_keep: Option<usize>,
    baseline: Baseline,
    timestamp: Option<DateTime<Utc>>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self {
            device_id: None,
            platform: DEFAULT_PLATFORM.to_string(),
            templates_dir: None,
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
            max_keep: Some(DEFAULT_MAX_KEEP),
            baseline: Baseline::Previous,
            timestamp: None,
        }
    }

    /// Use this device id instead of the one read from the capture.
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Set the platform name (default: "cisco_ios").
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Directory with an ntc-templates style `index` file.
    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = Some(dir.into());
        self
    }

    /// Directory holding the per-device history files.
    pub fn history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.history_dir = dir.into();
        self
    }

    /// Snapshots kept per device; `None` keeps all (default: 10).
    pub fn max_keep(mut self, max_keep: Option<usize>) -> Self {
        self.max_keep = max_keep;
        self
    }

    pub fn baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Fix the collection timestamp instead of using the current time.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> RunConfig {
        RunConfig {
            device_id: self.device_id,
            platform: self.platform,
            templates_dir: self.templates_dir,
            history_dir: self.history_dir,
            max_keep: self.max_keep,
            baseline: self.baseline,
            timestamp: self.timestamp,
        }
    }
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

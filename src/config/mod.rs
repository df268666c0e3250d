//! Archiver configuration snapshots.
//!
//! Configuration is JSON with camelCase keys. A loaded [`ArchiverConfig`] is
//! immutable; [`ConfigHandle`] hands out `Arc` snapshots and swaps in a new
//! one on reload, so a message is always processed against one consistent
//! configuration.
//!
//! ```json
//! {
//!   "archivalRules": [
//!     {"kind": "hostname", "pattern": "*.github.com", "archivalTool": "obelisk"},
//!     {"kind": "mimetype", "pattern": "image/*", "archivalTool": "direct_download"}
//!   ],
//!   "defaultArchivalTool": "do_nothing"
//! }
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::archiver::{
    DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_MAX_DOWNLOAD_BYTES, DEFAULT_MAX_SNAPSHOT_BYTES,
    DEFAULT_SNAPSHOT_TIMEOUT, ToolSettings,
};
use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::rules::{ArchivalRule, DO_NOTHING_TOOL, RuleKind};

/// Default cap on concurrently running URL pipelines.
pub const DEFAULT_MAX_CONCURRENT_ARCHIVES: usize = 8;

const CONFIG_DIR_NAME: &str = "link-archiver";
const CONFIG_FILE_NAME: &str = "config.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config JSON could not be parsed.
    #[error("failed to parse config: {source}")]
    Parse {
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range or malformed.
    #[error("Invalid config value for `{field}`: {message}")]
    Invalid {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiverConfig {
    /// User rules in evaluation order, without the trailing catch-all.
    pub archival_rules: Vec<ArchivalRule>,
    /// Tool used when no user rule matches.
    pub default_archival_tool: String,
    /// Cap on concurrently running URL pipelines (1..=100).
    pub max_concurrent_archives: usize,
    /// Probe request timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Direct download timeout in seconds.
    pub download_timeout_secs: u64,
    /// Whole-snapshot timeout in seconds.
    pub snapshot_timeout_secs: u64,
    /// Direct download size ceiling in bytes.
    pub max_download_bytes: u64,
    /// Snapshot size ceiling in bytes.
    pub max_snapshot_bytes: u64,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            archival_rules: Vec::new(),
            default_archival_tool: DO_NOTHING_TOOL.to_string(),
            max_concurrent_archives: DEFAULT_MAX_CONCURRENT_ARCHIVES,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT.as_secs(),
            snapshot_timeout_secs: DEFAULT_SNAPSHOT_TIMEOUT.as_secs(),
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
        }
    }
}

/// Older configs routed by MIME type only.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMimeMapping {
    #[serde(default)]
    mime_type_pattern: String,
    #[serde(default)]
    archival_tool: String,
}

/// The on-disk shape, before normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    archival_rules: Vec<ArchivalRule>,
    mime_type_mappings: Vec<LegacyMimeMapping>,
    default_archival_tool: Option<String>,
    max_concurrent_archives: Option<usize>,
    probe_timeout_secs: Option<u64>,
    download_timeout_secs: Option<u64>,
    snapshot_timeout_secs: Option<u64>,
    max_download_bytes: Option<u64>,
    max_snapshot_bytes: Option<u64>,
}

impl From<RawConfig> for ArchiverConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();

        let mut rules = if raw.archival_rules.is_empty() && !raw.mime_type_mappings.is_empty() {
            info!(
                count = raw.mime_type_mappings.len(),
                "migrating MIME type mappings to archival rules"
            );
            raw.mime_type_mappings
                .into_iter()
                .map(|m| {
                    ArchivalRule::new(RuleKind::MimeType, m.mime_type_pattern, m.archival_tool)
                })
                .collect()
        } else {
            raw.archival_rules
        };

        // A stored trailing catch-all is re-synthesized from the default tool.
        while rules.last().is_some_and(ArchivalRule::is_catch_all) {
            rules.pop();
        }

        let default_archival_tool = raw
            .default_archival_tool
            .filter(|tool| !tool.trim().is_empty())
            .unwrap_or(defaults.default_archival_tool);

        Self {
            archival_rules: rules,
            default_archival_tool,
            max_concurrent_archives: raw
                .max_concurrent_archives
                .unwrap_or(defaults.max_concurrent_archives),
            probe_timeout_secs: raw.probe_timeout_secs.unwrap_or(defaults.probe_timeout_secs),
            download_timeout_secs: raw
                .download_timeout_secs
                .unwrap_or(defaults.download_timeout_secs),
            snapshot_timeout_secs: raw
                .snapshot_timeout_secs
                .unwrap_or(defaults.snapshot_timeout_secs),
            max_download_bytes: raw.max_download_bytes.unwrap_or(defaults.max_download_bytes),
            max_snapshot_bytes: raw.max_snapshot_bytes.unwrap_or(defaults.max_snapshot_bytes),
        }
    }
}

impl ArchiverConfig {
    /// Parses and normalizes a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
        Ok(raw.into())
    }

    /// Reads, parses and validates the config at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rules as evaluated: user rules followed by the catch-all.
    #[must_use]
    pub fn effective_rules(&self) -> Vec<ArchivalRule> {
        let mut rules = self.archival_rules.clone();
        rules.push(ArchivalRule::catch_all(self.default_archival_tool.clone()));
        rules
    }

    /// Validates user rules and numeric settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, rule) in self.archival_rules.iter().enumerate() {
            let field = format!("archivalRules[{index}]");
            if let RuleKind::Unknown(kind) = &rule.kind {
                return Err(ConfigError::invalid(
                    field,
                    format!("unknown kind '{kind}'. Expected 'hostname' or 'mimetype'"),
                ));
            }
            if rule.pattern.trim().is_empty() {
                return Err(ConfigError::invalid(field, "pattern must not be empty"));
            }
            if rule.tool.trim().is_empty() {
                return Err(ConfigError::invalid(field, "archivalTool must not be empty"));
            }
        }

        validate_range(
            "maxConcurrentArchives",
            self.max_concurrent_archives as u64,
            1,
            100,
        )?;
        validate_range("probeTimeoutSecs", self.probe_timeout_secs, 1, 3600)?;
        validate_range("downloadTimeoutSecs", self.download_timeout_secs, 1, 3600)?;
        validate_range("snapshotTimeoutSecs", self.snapshot_timeout_secs, 1, 3600)?;
        validate_range("maxDownloadBytes", self.max_download_bytes, 1, u64::MAX)?;
        validate_range("maxSnapshotBytes", self.max_snapshot_bytes, 1, u64::MAX)?;
        Ok(())
    }

    /// Tools referenced by the config that are not in `registered`.
    ///
    /// The do-nothing sentinel is never reported.
    #[must_use]
    pub fn unknown_tools(&self, registered: &[String]) -> Vec<String> {
        let mut unknown: Vec<String> = self
            .effective_rules()
            .into_iter()
            .map(|rule| rule.tool)
            .filter(|tool| tool != DO_NOTHING_TOOL && !registered.contains(tool))
            .collect();
        unknown.sort();
        unknown.dedup();
        unknown
    }

    /// Probe request timeout.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Timeouts and ceilings for the built-in tools.
    #[must_use]
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            snapshot_timeout: Duration::from_secs(self.snapshot_timeout_secs),
            max_download_bytes: self.max_download_bytes,
            max_snapshot_bytes: self.max_snapshot_bytes,
        }
    }
}

fn validate_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    let expected = if max == u64::MAX {
        format!("at least {min}")
    } else {
        format!("range {min}..={max}")
    };
    Err(ConfigError::invalid(
        field,
        format!("{value}. Expected {expected}"),
    ))
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/link-archiver/config.json`
/// 2. `$HOME/.config/link-archiver/config.json`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// A loaded config and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The path that was consulted, if any.
    pub path: Option<PathBuf>,
    /// The resulting configuration (defaults when nothing was loaded).
    pub config: ArchiverConfig,
    /// Whether `config` came from a file.
    pub loaded_from_file: bool,
}

/// Loads `explicit` if given, else the default path when it exists, else defaults.
///
/// # Errors
///
/// Returns [`ConfigError`] when an existing (or explicitly named) file is invalid.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: ArchiverConfig::load(path)?,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(existing) if existing.exists() => Ok(LoadedConfig {
            config: ArchiverConfig::load(existing)?,
            path,
            loaded_from_file: true,
        }),
        _ => Ok(LoadedConfig {
            path,
            config: ArchiverConfig::default(),
            loaded_from_file: false,
        }),
    }
}

/// Shared, hot-swappable configuration.
#[derive(Debug, Default)]
pub struct ConfigHandle {
    current: RwLock<Arc<ArchiverConfig>>,
}

impl ConfigHandle {
    /// Creates a handle holding `config`.
    #[must_use]
    pub fn new(config: ArchiverConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The active snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ArchiverConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the active snapshot.
    pub fn replace(&self, config: ArchiverConfig) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Reloads from `path`. On failure the previous snapshot stays active.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be loaded or validated.
    pub fn reload(&self, path: &Path) -> Result<Arc<ArchiverConfig>, ConfigError> {
        match ArchiverConfig::load(path) {
            Ok(config) => {
                self.replace(config);
                info!(path = %path.display(), "configuration reloaded");
                Ok(self.snapshot())
            }
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "configuration reload failed, keeping previous"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ArchiverConfig::from_json("{}").unwrap();
        assert_eq!(config, ArchiverConfig::default());
        assert_eq!(config.default_archival_tool, DO_NOTHING_TOOL);
        assert_eq!(config.effective_rules(), vec![ArchivalRule::catch_all(DO_NOTHING_TOOL)]);
    }

    #[test]
    fn test_effective_rules_end_with_default_tool() {
        let config = ArchiverConfig::from_json(
            r#"{"archivalRules": [{"kind": "hostname", "pattern": "*.github.com", "archivalTool": "obelisk"}],
                "defaultArchivalTool": "direct_download"}"#,
        )
        .unwrap();

        let rules = config.effective_rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].pattern, "*.github.com");
        assert!(rules[1].is_catch_all());
        assert_eq!(rules[1].tool, "direct_download");
        assert_eq!(config.archival_rules.len(), 1, "catch-all is never a user rule");
    }

    #[test]
    fn test_stored_trailing_catch_all_is_dropped() {
        let config = ArchiverConfig::from_json(
            r#"{"archivalRules": [
                  {"kind": "mimetype", "pattern": "image/*", "archivalTool": "direct_download"},
                  {"kind": "default", "pattern": "", "archivalTool": "obelisk"}
               ],
               "defaultArchivalTool": "do_nothing"}"#,
        )
        .unwrap();

        assert_eq!(config.archival_rules.len(), 1);
        assert_eq!(config.effective_rules()[1].tool, DO_NOTHING_TOOL);
    }

    #[test]
    fn test_legacy_mime_mappings_migrate() {
        let config = ArchiverConfig::from_json(
            r#"{"mimeTypeMappings": [
                  {"mimeTypePattern": "application/pdf", "archivalTool": "direct_download"},
                  {"mimeTypePattern": "text/html", "archivalTool": "obelisk"}
               ]}"#,
        )
        .unwrap();

        assert_eq!(
            config.archival_rules,
            vec![
                ArchivalRule::new(RuleKind::MimeType, "application/pdf", "direct_download"),
                ArchivalRule::new(RuleKind::MimeType, "text/html", "obelisk"),
            ]
        );
    }

    #[test]
    fn test_legacy_mappings_ignored_when_rules_present() {
        let config = ArchiverConfig::from_json(
            r#"{"archivalRules": [{"kind": "hostname", "pattern": "a.com", "archivalTool": "x"}],
                "mimeTypeMappings": [{"mimeTypePattern": "text/html", "archivalTool": "y"}]}"#,
        )
        .unwrap();
        assert_eq!(config.archival_rules.len(), 1);
        assert_eq!(config.archival_rules[0].tool, "x");
    }

    #[test]
    fn test_blank_default_tool_falls_back() {
        let config = ArchiverConfig::from_json(r#"{"defaultArchivalTool": "  "}"#).unwrap();
        assert_eq!(config.default_archival_tool, DO_NOTHING_TOOL);
    }

    #[test]
    fn test_validate_rejects_bad_rules_with_index() {
        let config = ArchiverConfig::from_json(
            r#"{"archivalRules": [
                  {"kind": "hostname", "pattern": "a.com", "archivalTool": "x"},
                  {"kind": "hostnme", "pattern": "b.com", "archivalTool": "x"}
               ]}"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("archivalRules[1]"), "unexpected: {err}");
        assert!(err.contains("hostnme"), "unexpected: {err}");

        let config = ArchiverConfig::from_json(
            r#"{"archivalRules": [{"kind": "hostname", "pattern": "a.com", "archivalTool": ""}]}"#,
        )
        .unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("archivalTool"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_numbers() {
        let config = ArchiverConfig::from_json(r#"{"maxConcurrentArchives": 0}"#).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("maxConcurrentArchives"), "unexpected: {err}");
        assert!(err.contains("1..=100"), "unexpected: {err}");

        let config = ArchiverConfig::from_json(r#"{"probeTimeoutSecs": 0}"#).unwrap();
        assert!(config.validate().is_err());

        assert!(ArchiverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unknown_tools_skips_sentinel() {
        let config = ArchiverConfig::from_json(
            r#"{"archivalRules": [
                  {"kind": "hostname", "pattern": "a.com", "archivalTool": "wayback"},
                  {"kind": "hostname", "pattern": "b.com", "archivalTool": "obelisk"}
               ]}"#,
        )
        .unwrap();
        let registered = vec!["direct_download".to_string(), "obelisk".to_string()];
        assert_eq!(config.unknown_tools(&registered), vec!["wayback"]);
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(matches!(
            ArchiverConfig::from_json("{not json"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_handle_reload_swaps_and_keeps_previous_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let handle = ConfigHandle::new(ArchiverConfig::default());
        let before = handle.snapshot();

        std::fs::write(&path, r#"{"defaultArchivalTool": "obelisk"}"#).unwrap();
        handle.reload(&path).unwrap();
        assert_eq!(handle.snapshot().default_archival_tool, "obelisk");
        assert_eq!(before.default_archival_tool, DO_NOTHING_TOOL, "old snapshot is untouched");

        std::fs::write(&path, r#"{"maxConcurrentArchives": 500}"#).unwrap();
        assert!(handle.reload(&path).is_err());
        assert_eq!(handle.snapshot().default_archival_tool, "obelisk");
    }

    #[test]
    fn test_load_config_explicit_missing_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_config(Some(&temp_dir.path().join("absent.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_tool_settings_from_config() {
        let config = ArchiverConfig::from_json(
            r#"{"downloadTimeoutSecs": 5, "maxSnapshotBytes": 1024}"#,
        )
        .unwrap();
        let settings = config.tool_settings();
        assert_eq!(settings.download_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_snapshot_bytes, 1024);
        assert_eq!(settings.max_download_bytes, DEFAULT_MAX_DOWNLOAD_BYTES);
    }
}

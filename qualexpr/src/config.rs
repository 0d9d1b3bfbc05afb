//! Configuration loading from qualexpr.toml
//!
//! Desk configuration can be specified in a `qualexpr.toml` file in the project root.
//! The configuration is discovered by walking up from the current directory.
//! The `QUALEXPR_VERBOSITY` environment variable overrides the diagnostics level.

use qualexpr_core::DEFAULT_MAX_OPEN_EVENTS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Environment variable overriding `diagnostics.verbosity`
pub const VERBOSITY_ENV: &str = "QUALEXPR_VERBOSITY";

/// File name looked up by [`QualExprConfig::discover`]
pub const CONFIG_FILE: &str = "qualexpr.toml";

/// Errors from loading configuration
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid configuration TOML
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Unrecognized verbosity level
    #[error("invalid verbosity {0:?} (expected off, on, full, full-events or 0..=3)")]
    InvalidVerbosity(String),
}

/// How much internal state the desk traces
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    /// Nothing
    #[default]
    Off,
    /// Lifecycle transitions and new expressions
    On,
    /// Also dumps of namespaces, aggregator kinds and evaluators
    Full,
    /// Also every counter read, reset and removal
    FullEvents,
}

impl Verbosity {
    /// Whether messages of `level` are emitted at this verbosity
    pub fn allows(self, level: Verbosity) -> bool {
        level != Verbosity::Off && self >= level
    }
}

impl FromStr for Verbosity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(Verbosity::Off),
            "on" | "1" => Ok(Verbosity::On),
            "full" | "2" => Ok(Verbosity::Full),
            "full-events" | "full_events" | "3" => Ok(Verbosity::FullEvents),
            _ => Err(ConfigError::InvalidVerbosity(s.to_string())),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verbosity::Off => "off",
            Verbosity::On => "on",
            Verbosity::Full => "full",
            Verbosity::FullEvents => "full-events",
        })
    }
}

/// Desk configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualExprConfig {
    /// Diagnostics configuration
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiagnosticsConfig {
    /// Trace level: "off", "on", "full" or "full-events"
    #[serde(default)]
    pub verbosity: Verbosity,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Enable measures as soon as the desk is initialized
    #[serde(default)]
    pub start_enabled: bool,
    /// Bound on concurrently open START events
    #[serde(default = "default_max_open_events")]
    pub max_open_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_enabled: false,
            max_open_events: default_max_open_events(),
        }
    }
}

fn default_max_open_events() -> usize {
    DEFAULT_MAX_OPEN_EVENTS
}

impl QualExprConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Discover and load configuration by walking up from the current directory
    ///
    /// `Ok(None)` when no `qualexpr.toml` is found. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Ok(None),
        }
    }

    /// Discover configuration walking up from `start`
    pub fn discover_from(start: &Path) -> Result<Option<Self>, ConfigError> {
        for dir in start.ancestors() {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                return Self::load(&config_path).map(Some);
            }
        }
        Ok(None)
    }

    /// Discovered configuration (or defaults) with environment overrides applied
    pub fn from_environment() -> Result<Self, ConfigError> {
        let config = Self::discover()?.unwrap_or_default();
        config.with_verbosity_override(std::env::var(VERBOSITY_ENV).ok().as_deref())
    }

    /// Apply a verbosity override such as the value of `QUALEXPR_VERBOSITY`
    ///
    /// `None` or an empty string leaves the configured level alone.
    pub fn with_verbosity_override(mut self, value: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.diagnostics.verbosity = value.parse()?;
        }
        Ok(self)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# QualExpr Configuration

[diagnostics]
# Trace level: off, on, full, full-events
# (QUALEXPR_VERBOSITY overrides this, also accepting 0..=3)
verbosity = "off"

[engine]
# Enable measures as soon as the desk is initialized
start_enabled = false
# Bound on concurrently open START events
max_open_events = 65536
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QualExprConfig::default();
        assert_eq!(config.diagnostics.verbosity, Verbosity::Off);
        assert!(!config.engine.start_enabled);
        assert_eq!(config.engine.max_open_events, 65_536);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [diagnostics]
            verbosity = "full-events"
        "#;

        let config: QualExprConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.diagnostics.verbosity, Verbosity::FullEvents);
        // Defaults should still apply
        assert_eq!(config.engine.max_open_events, 65_536);
    }

    #[test]
    fn test_default_toml_parses() {
        let config: QualExprConfig = toml::from_str(&QualExprConfig::default_toml()).unwrap();
        assert_eq!(config.diagnostics.verbosity, Verbosity::Off);
        assert_eq!(config.engine.max_open_events, DEFAULT_MAX_OPEN_EVENTS);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!("2".parse::<Verbosity>().unwrap(), Verbosity::Full);
        assert_eq!("ON".parse::<Verbosity>().unwrap(), Verbosity::On);
        assert_eq!("full_events".parse::<Verbosity>().unwrap(), Verbosity::FullEvents);
        assert!("loud".parse::<Verbosity>().is_err());

        assert!(Verbosity::Full.allows(Verbosity::On));
        assert!(!Verbosity::On.allows(Verbosity::Full));
        assert!(!Verbosity::Off.allows(Verbosity::Off));
    }

    #[test]
    fn test_verbosity_override() {
        let config = QualExprConfig::default()
            .with_verbosity_override(Some("3"))
            .unwrap();
        assert_eq!(config.diagnostics.verbosity, Verbosity::FullEvents);

        let config = config.with_verbosity_override(Some("  ")).unwrap();
        assert_eq!(config.diagnostics.verbosity, Verbosity::FullEvents);

        assert!(matches!(
            QualExprConfig::default().with_verbosity_override(Some("max")),
            Err(ConfigError::InvalidVerbosity(_))
        ));
    }

    #[test]
    fn test_discover_walks_up() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(QualExprConfig::discover_from(&nested).unwrap().is_none());

        std::fs::write(
            root.path().join(CONFIG_FILE),
            "[engine]\nstart_enabled = true\n",
        )
        .unwrap();
        let config = QualExprConfig::discover_from(&nested).unwrap().unwrap();
        assert!(config.engine.start_enabled);
    }

    #[test]
    fn test_discover_malformed_file_errors() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE), "[engine\nstart_enabled = yes\n").unwrap();

        let err = QualExprConfig::discover_from(root.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        std::fs::write(
            root.path().join(CONFIG_FILE),
            "[diagnostics]\nverbosity = \"loud\"\n",
        )
        .unwrap();
        assert!(QualExprConfig::discover_from(root.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = QualExprConfig::load("/nonexistent/qualexpr.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

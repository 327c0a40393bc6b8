//! Runtime configuration - TOML file, environment, or defaults
//!
//! Design: One immutable `RuntimeConfig` is installed per process. Readers
//! that run before installation (or without it) see the defaults.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "LAZYCLONE_CONFIG";

/// Largest memo table a fresh label may start with
const MAX_INITIAL_CAPACITY: usize = 1 << 24;

static ACTIVE: OnceCell<RuntimeConfig> = OnceCell::new();
static DEFAULT: OnceCell<RuntimeConfig> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub memo: MemoSettings,

    #[serde(default)]
    pub gc: GcSettings,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoSettings {
    /// Slots in a fresh label's memo; zero defers allocation to first use
    #[serde(default = "default_capacity")]
    pub initial_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcSettings {
    /// Collect cycles automatically when the candidate buffer fills
    #[serde(default = "default_false")]
    pub auto_collect: bool,

    /// Candidate buffer size per thread
    #[serde(default = "default_threshold")]
    pub threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memo: MemoSettings::default(),
            gc: GcSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Default for MemoSettings {
    fn default() -> Self {
        Self {
            initial_capacity: default_capacity(),
        }
    }
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            auto_collect: false,
            threshold: default_threshold(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_false() -> bool { false }
fn default_capacity() -> usize { 16 }
fn default_threshold() -> usize { 1024 }
fn default_level() -> String { "info".to_string() }

/// Errors raised while loading configuration
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            Self::Parse(err) => write!(f, "Failed to parse config: {}", err),
            Self::Invalid { field, reason } => {
                write!(f, "Invalid config value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err)
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `LAZYCLONE_CONFIG`, or the defaults when unset
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memo.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(ConfigError::Invalid {
                field: "memo.initial_capacity",
                reason: format!("must be at most {}", MAX_INITIAL_CAPACITY),
            });
        }
        if self.gc.threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "gc.threshold",
                reason: "must be positive".to_string(),
            });
        }
        if crate::logging::parse_level(&self.log.level).is_none() {
            return Err(ConfigError::Invalid {
                field: "log.level",
                reason: format!("unknown level '{}'", self.log.level),
            });
        }
        Ok(())
    }
}

/// Install the process-wide configuration.
///
/// Returns false if a configuration was already installed; the first one
/// stays in effect.
pub fn install(config: RuntimeConfig) -> bool {
    ACTIVE.set(config).is_ok()
}

/// The installed configuration, or the defaults
pub fn get() -> &'static RuntimeConfig {
    ACTIVE
        .get()
        .unwrap_or_else(|| DEFAULT.get_or_init(RuntimeConfig::default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.memo.initial_capacity, 16);
        assert!(!config.gc.auto_collect);
        assert_eq!(config.gc.threshold, 1024);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str("[gc]\nauto_collect = true\n").unwrap();
        assert!(config.gc.auto_collect);
        assert_eq!(config.gc.threshold, 1024);
        assert_eq!(config.memo, MemoSettings::default());
    }

    #[test]
    fn test_full_toml() {
        let content = r#"
            [memo]
            initial_capacity = 64

            [gc]
            auto_collect = true
            threshold = 32

            [log]
            level = "debug"
            json = true
        "#;
        let config = RuntimeConfig::from_toml_str(content).unwrap();
        assert_eq!(config.memo.initial_capacity, 64);
        assert_eq!(config.gc.threshold, 32);
        assert_eq!(config.log.level, "debug");
        assert!(config.log.json);
    }

    #[test]
    fn test_invalid_values() {
        let err = RuntimeConfig::from_toml_str("[gc]\nthreshold = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "gc.threshold", .. }));

        let err = RuntimeConfig::from_toml_str("[log]\nlevel = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("log.level"));
    }

    #[test]
    fn test_parse_error() {
        let err = RuntimeConfig::from_toml_str("[memo\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memo]\ninitial_capacity = 0").unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.memo.initial_capacity, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuntimeConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_roundtrip_serialize() {
        let config = RuntimeConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::from_toml_str(&text).unwrap(), config);
    }
}

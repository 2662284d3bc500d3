//! Interpreter configuration
//!
//! Configuration is plain TOML; every key is optional and falls back to its
//! default.
//!
//! ```toml
//! raw-input = false
//! fatal-warnings = true
//! unload-policy = "reject-live-dependents"
//! library-search-paths = ["/opt/weft/lib"]
//! ```
//!
//! # Usage
//!
//! ```rust
//! use weft::util::config::InterpreterConfig;
//!
//! let config = InterpreterConfig::from_toml_str("fatal-warnings = true").unwrap();
//! assert!(config.fatal_warnings);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "WEFT_CONFIG";

/// What to do when unloading a transaction that later transactions call into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UnloadPolicy {
    /// Unload anyway; dependents report unresolved symbols on their next run
    #[default]
    AllowDangling,
    /// Refuse the unload while dependents are live
    RejectLiveDependents,
}

/// Interpreter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterpreterConfig {
    /// Never wrap input; everything is compiled as top-level declarations
    #[serde(default)]
    pub raw_input: bool,
    /// Dump every lowered unit at debug level
    #[serde(default)]
    pub print_ir: bool,
    /// Treat non-benign warnings as fatal
    #[serde(default)]
    pub fatal_warnings: bool,
    /// Unload behaviour for transactions with live dependents
    #[serde(default)]
    pub unload_policy: UnloadPolicy,
    /// Directories searched for relative library names
    #[serde(default)]
    pub library_search_paths: Vec<PathBuf>,
    /// Maximum nesting of calls in generated code
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Maximum number of local slots per generated function
    #[serde(default = "default_max_frame_slots")]
    pub max_frame_slots: usize,
    /// Run outstanding at-exit actions when the interpreter is dropped
    #[serde(default = "default_true")]
    pub run_destructors_on_drop: bool,
}

fn default_max_call_depth() -> usize {
    512
}

fn default_max_frame_slots() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            raw_input: false,
            print_ir: false,
            fatal_warnings: false,
            unload_policy: UnloadPolicy::default(),
            library_search_paths: Vec::new(),
            max_call_depth: default_max_call_depth(),
            max_frame_slots: default_max_frame_slots(),
            run_destructors_on_drop: true,
        }
    }
}

impl InterpreterConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from the file named by `WEFT_CONFIG`, or defaults when unset
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = InterpreterConfig::from_toml_str("").unwrap();
        assert!(!config.raw_input);
        assert_eq!(config.unload_policy, UnloadPolicy::AllowDangling);
        assert_eq!(config.max_call_depth, 512);
        assert!(config.run_destructors_on_drop);
    }

    #[test]
    fn test_kebab_case_keys() {
        let config = InterpreterConfig::from_toml_str(
            r#"
            fatal-warnings = true
            unload-policy = "reject-live-dependents"
            library-search-paths = ["/opt/lib"]
            max-frame-slots = 8
            "#,
        )
        .unwrap();
        assert!(config.fatal_warnings);
        assert_eq!(config.unload_policy, UnloadPolicy::RejectLiveDependents);
        assert_eq!(config.library_search_paths, vec![PathBuf::from("/opt/lib")]);
        assert_eq!(config.max_frame_slots, 8);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "raw-input = true").unwrap();
        let config = InterpreterConfig::load(file.path()).unwrap();
        assert!(config.raw_input);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = InterpreterConfig::load(Path::new("/nonexistent/weft.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = InterpreterConfig {
            print_ir: true,
            ..InterpreterConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        let back = InterpreterConfig::from_toml_str(&text).unwrap();
        assert!(back.print_ir);
    }
}

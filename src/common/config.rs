//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Validation defaults
    #[serde(default)]
    pub validation: ValidationDefaults,

    /// Function library settings
    #[serde(default)]
    pub functions: FunctionConfig,

    /// Global variables seeded into every test context
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Timeout settings in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Default timeout for receive actions
    #[serde(default = "default_receive")]
    pub receive_ms: u64,

    /// Interval at which correlated receives poll for a match
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            receive_ms: default_receive(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Timeouts {
    pub fn receive(&self) -> Duration {
        Duration::from_millis(self.receive_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_receive() -> u64 {
    5_000
}
fn default_poll_interval() -> u64 {
    100
}

/// Defaults applied to every new validation context
#[derive(Debug, Deserialize, Clone)]
pub struct ValidationDefaults {
    /// Element and attribute counts must match after ignore-set exclusion
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Collapse whitespace before comparing plaintext payloads
    #[serde(default)]
    pub ignore_whitespace: bool,
}

impl Default for ValidationDefaults {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            ignore_whitespace: false,
        }
    }
}

fn default_strict() -> bool {
    true
}

/// Function library configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FunctionConfig {
    /// Prefix of the built-in function library (`core:concat(...)`)
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

fn default_prefix() -> String {
    "core".to_string()
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;

        if config.functions.prefix.is_empty()
            || !config
                .functions
                .prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(super::Error::Config(format!(
                "Invalid function library prefix '{}'",
                config.functions.prefix
            )));
        }

        Ok(config)
    }
}

/*!
 * Configuration types for gridlink
 */

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{GridError, Result};

/// Environment variable that overrides the configured account password
pub const PASSWORD_ENV: &str = "GRIDLINK_PASSWORD";

/// Top-level configuration loaded from `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridConfig {
    /// Remote account credentials
    #[serde(default)]
    pub account: Account,

    /// Which driver opens connections
    #[serde(default)]
    pub driver: DriverConfig,

    /// Transfer behaviour for batch operations
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Write JSON logs to this file instead of the terminal
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Force debug logging
    #[serde(default)]
    pub verbose: bool,
}

/// Credentials and defaults of one remote account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    /// Never serialized and redacted in `Debug` output
    #[serde(
        default = "empty_secret",
        deserialize_with = "deserialize_secret",
        skip_serializing
    )]
    pub password: SecretString,

    /// Home collection; relative remote paths resolve against it
    #[serde(default = "default_home")]
    pub home: String,

    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub default_resource: String,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Account {
    /// `user@host:port`, used in logs and connection errors
    pub fn endpoint(&self) -> String {
        if self.username.is_empty() {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("{}@{}:{}", self.username, self.host, self.port)
        }
    }

    /// The password, or `None` when unset
    pub fn password_str(&self) -> Option<&str> {
        let secret = self.password.expose_secret();
        if secret.is_empty() {
            None
        } else {
            Some(secret)
        }
    }

    pub fn set_password(&mut self, password: &str) {
        self.password = SecretString::from(password.to_string());
    }

    /// Replace the password with `GRIDLINK_PASSWORD` when that is set
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.password = SecretString::from(password);
        }
    }
}

impl Default for Account {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: String::new(),
            password: empty_secret(),
            home: default_home(),
            domain: String::new(),
            default_resource: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Driver selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-process namespace, empty on every run
    Memory,

    /// Local directory tree
    #[default]
    Local,

    /// SFTP over SSH (feature `ssh-backend`)
    Ssh,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Memory => write!(f, "memory"),
            DriverKind::Local => write!(f, "local"),
            DriverKind::Ssh => write!(f, "ssh"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub kind: DriverKind,

    /// Root directory served by the local driver
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Private key for SSH public key authentication
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Authenticate through the SSH agent
    #[serde(default)]
    pub agent: bool,
}

/// Transfer settings shared by get, put and copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Block size of the streaming fallback
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub error_mode: ErrorMode,

    #[serde(default)]
    pub overwrite: OverwritePolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            error_mode: ErrorMode::default(),
            overwrite: OverwritePolicy::default(),
        }
    }
}

/// Error handling mode of a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Record the failure and continue with the next item
    #[default]
    Skip,

    /// Stop at the first failing item
    Abort,
}

/// What to do when a transfer target already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Ask on the terminal
    #[default]
    Prompt,

    /// Overwrite without asking
    Always,

    /// Never overwrite; existing targets are skipped
    Never,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1247
}

fn default_home() -> String {
    "/".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    20_000
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(SecretString::from(value.unwrap_or_default()))
}

impl GridConfig {
    /// Load configuration from a TOML file and apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: GridConfig = toml::from_str(&contents)
            .map_err(|e| GridError::Config(format!("{}: {}", path.display(), e)))?;
        config.account.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file; the password is never written
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| GridError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `<config dir>/gridlink/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gridlink").join("config.toml"))
    }

    /// Reject settings no driver could run with
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            return Err(GridError::Config(
                "transfer.chunk_size must be greater than zero".to_string(),
            ));
        }
        if !self.account.home.starts_with('/') {
            return Err(GridError::Config(format!(
                "account.home must be an absolute path, got '{}'",
                self.account.home
            )));
        }
        if self.driver.kind == DriverKind::Local && self.driver.root.is_none() {
            return Err(GridError::Config(
                "driver.root is required for the local driver".to_string(),
            ));
        }
        Ok(())
    }
}

//! Process settings
//!
//! Loaded once at start-up from a TOML file. Terminus selection reads the
//! `values` table (e.g. `facts_terminus = "yaml"`), cache selection reads the
//! `cache` table, and each terminus receives its own options table from
//! `[termini.<indirection>.<terminus>]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {path}")]
    NotFound { path: String },

    #[error("I/O error reading settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Which side of the exchange this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Master,
    Agent,
    User,
}

impl std::str::FromStr for RunMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" | "server" => Ok(RunMode::Master),
            "agent" => Ok(RunMode::Agent),
            "user" => Ok(RunMode::User),
            other => Err(SettingsError::Invalid(format!("Unknown run mode: {}", other))),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunMode::Master => "master",
            RunMode::Agent => "agent",
            RunMode::User => "user",
        })
    }
}

/// Free-form options for one terminus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminusOptions(pub BTreeMap<String, Value>);

impl TerminusOptions {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// String list option; a single string counts as a one-element list
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// One authorization rule in auth.conf style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRuleConfig {
    /// Path prefix, or a regular expression when prefixed with `~ `
    pub path: String,

    /// HTTP-level methods the rule covers (find, search, save, destroy, head);
    /// empty means all
    #[serde(default)]
    pub methods: Vec<String>,

    /// Allowed client names; `*` allows anyone, `$1` refers to a regex capture
    #[serde(default)]
    pub allow: Vec<String>,

    /// `Some(true)` requires a verified identity, `Some(false)` requires none
    #[serde(default)]
    pub authenticated: Option<bool>,
}

/// Header names carrying the identity verified by the TLS terminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentityConfig {
    #[serde(default = "default_dn_header")]
    pub dn_header: String,

    #[serde(default = "default_verify_header")]
    pub verify_header: String,
}

impl Default for ClientIdentityConfig {
    fn default() -> Self {
        Self {
            dn_header: default_dn_header(),
            verify_header: default_verify_header(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Process-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub run_mode: RunMode,

    /// Root directory for file-backed termini
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Remote server used by REST termini
    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Address the HTTP API binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Seconds between agent runs; the default instance TTL
    #[serde(default = "default_runinterval")]
    pub runinterval: u64,

    #[serde(default = "default_connect_timeout")]
    pub http_connect_timeout: u64,

    #[serde(default = "default_read_timeout")]
    pub http_read_timeout: u64,

    /// Named setting values, including `<indirection>_terminus` selectors
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    /// Cache terminus per indirection
    #[serde(default)]
    pub cache: BTreeMap<String, String>,

    /// Options per indirection, per terminus
    #[serde(default)]
    pub termini: BTreeMap<String, BTreeMap<String, TerminusOptions>>,

    /// Directory whose sub-directories are environments
    #[serde(default)]
    pub environment_path: Option<PathBuf>,

    /// Static environment list, used when no environment path is set
    #[serde(default = "default_environments")]
    pub environments: Vec<String>,

    /// Seconds a loaded environment stays cached
    #[serde(default = "default_environment_timeout")]
    pub environment_timeout: u64,

    #[serde(default)]
    pub auth: Vec<AuthRuleConfig>,

    #[serde(default)]
    pub client_identity: ClientIdentityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/indirector")
}

fn default_server() -> String {
    "puppet".to_string()
}

fn default_port() -> u16 {
    8140
}

fn default_listen() -> String {
    "0.0.0.0:8140".to_string()
}

fn default_runinterval() -> u64 {
    1800
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    120
}

fn default_environments() -> Vec<String> {
    vec!["production".to_string()]
}

fn default_environment_timeout() -> u64 {
    180
}

fn default_dn_header() -> String {
    "X-Client-DN".to_string()
}

fn default_verify_header() -> String {
    "X-Client-Verify".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            data_dir: default_data_dir(),
            server: default_server(),
            port: default_port(),
            listen: default_listen(),
            runinterval: default_runinterval(),
            http_connect_timeout: default_connect_timeout(),
            http_read_timeout: default_read_timeout(),
            values: BTreeMap::new(),
            cache: BTreeMap::new(),
            termini: BTreeMap::new(),
            environment_path: None,
            environments: default_environments(),
            environment_timeout: default_environment_timeout(),
            auth: Vec::new(),
            client_identity: ClientIdentityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SettingsError::NotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.runinterval == 0 {
            return Err(SettingsError::Invalid("runinterval must be positive".into()));
        }
        if self.server.is_empty() {
            return Err(SettingsError::Invalid("server cannot be empty".into()));
        }
        for rule in &self.auth {
            if rule.path.is_empty() {
                return Err(SettingsError::Invalid("auth rule with empty path".into()));
            }
        }
        Ok(())
    }

    /// Value of a named setting
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Cache terminus configured for an indirection
    pub fn cache_for(&self, indirection: &str) -> Option<&str> {
        self.cache.get(indirection).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Options table for one terminus of one indirection
    pub fn terminus_options(&self, indirection: &str, terminus: &str) -> TerminusOptions {
        self.termini
            .get(indirection)
            .and_then(|by_name| by_name.get(terminus))
            .cloned()
            .unwrap_or_default()
    }

    pub fn runinterval(&self) -> Duration {
        Duration::from_secs(self.runinterval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.http_read_timeout)
    }

    pub fn environment_timeout(&self) -> Duration {
        Duration::from_secs(self.environment_timeout)
    }
}

//! Configuration for bbsterm.
//!
//! Loaded from `~/.bbsterm/config.toml`. Every field has a default, so a
//! missing file or a partial one is fine.
//!
//! # Configuration File
//!
//! ```toml
//! connect_timeout_ms = 10000
//! poll_interval_ms = 50
//! line_ending = "\r\n"
//!
//! [prompts]
//! login = ["login", "username"]
//! password = ["password"]
//!
//! [telnet]
//! accept_remote = [1, 3]   # let the BBS echo and suppress go-ahead
//! offer_local = [24]       # report our terminal type
//! terminal_type = "ANSI"
//!
//! [[bbs]]
//! name = "Example"
//! address = "bbs.example.org"
//! port = 23
//! username = "guest"
//! password = "secret"
//! ```
//!
//! Profiles are only read here; editing them is left to the front end.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::core::telnet::{NegotiationPolicy, PromptKeywords, SessionOptions, SessionParameters, DEFAULT_PORT};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Read(PathBuf, #[source] io::Error),

    #[error("Invalid configuration in {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection attempt timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Worker poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Terminator sent after auto-submitted credentials
    pub line_ending: String,
    pub prompts: PromptConfig,
    pub telnet: TelnetConfig,
    /// Saved BBS profiles
    pub bbs: Vec<BbsProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            poll_interval_ms: 50,
            line_ending: "\r\n".to_string(),
            prompts: PromptConfig::default(),
            telnet: TelnetConfig::default(),
            bbs: Vec::new(),
        }
    }
}

/// Prompt keywords for automatic login
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub login: Vec<String>,
    pub password: Vec<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let keywords = PromptKeywords::default();
        Self {
            login: keywords.login,
            password: keywords.password,
        }
    }
}

/// Telnet option negotiation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelnetConfig {
    pub accept_remote: Vec<u8>,
    pub offer_local: Vec<u8>,
    pub terminal_type: String,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            accept_remote: Vec::new(),
            offer_local: Vec::new(),
            terminal_type: NegotiationPolicy::default().terminal_type,
        }
    }
}

/// A saved BBS
#[derive(Debug, Clone, Deserialize)]
pub struct BbsProfile {
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl BbsProfile {
    pub fn session_parameters(&self) -> SessionParameters {
        SessionParameters {
            host: self.address.clone(),
            port: self.port,
            username: self.username.clone().filter(|u| !u.is_empty()),
            password: self.password.clone().filter(|p| !p.is_empty()),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when the file is missing or invalid.
    pub fn load() -> Self {
        let Some(path) = Self::get_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::parse(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Directory holding the config and log files
    pub fn config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".bbsterm"))
    }

    /// Get config file path
    pub fn get_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Session tunables from this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms.max(1)),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            policy: NegotiationPolicy {
                accept_remote: self.telnet.accept_remote.iter().copied().collect(),
                offer_local: self.telnet.offer_local.iter().copied().collect(),
                terminal_type: self.telnet.terminal_type.clone(),
            },
            prompts: PromptKeywords {
                login: self.prompts.login.clone(),
                password: self.prompts.password.clone(),
            },
            line_ending: self.line_ending.clone(),
        }
    }

    /// Find a profile by name, ignoring case
    pub fn profile(&self, name: &str) -> Option<&BbsProfile> {
        self.bbs.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Connection parameters for a saved profile
    pub fn session_parameters(&self, name: &str) -> Option<SessionParameters> {
        self.profile(name).map(BbsProfile::session_parameters)
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

// src/config/model.rs

use serde::Deserialize;
use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

use nfdriver::{Direction, FilteringFlag, NfRule, Protocol};

use crate::status::NfError;

/// Top-level runtime config
#[derive(Debug)]
pub struct Config {
    pub driver:          DriverSettings,
    pub logging:         LoggingConfig,
    pub capture:         Option<CaptureSettings>,
    pub block_processes: Vec<String>,
    pub rules:           Vec<RuleSpec>,
}

/// Typed `[driver]` table
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub name:        String,
    pub library:     PathBuf,
    pub register:    bool,
    pub tcp_timeout: Option<Duration>,
}

/// Typed `[capture]` table
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub path:           PathBuf,
    pub queue_capacity: usize,
}

/// A rule ready for `nf_addRule`
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub rule:    NfRule,
    pub to_head: bool,
}

// ───── raw TOML mirror ──────────────────────────────────────────────────────

/// Whole file as written on disk
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub driver:  RawDriver,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub capture: Option<RawCapture>,
    #[serde(default)]
    pub policy:  RawPolicy,
    #[serde(default)]
    pub rules:   Vec<RawRule>,
}

/// Mirror of the `[driver]` table; `name` is required
#[derive(Debug, Deserialize)]
pub struct RawDriver {
    pub name: String,
    #[serde(default = "default_library")] pub library:     String,
    #[serde(default)]                     pub register:    bool,
    #[serde(default)]                     pub tcp_timeout: Option<String>,
}
fn default_library() -> String { "nfapi.dll".into() }

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]                   pub enable: bool,
    #[serde(default)]                   pub file:   Option<String>,
    #[serde(default = "default_level")] pub level:  String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[capture]` table
#[derive(Debug, Deserialize)]
pub struct RawCapture {
    pub path: String,
    #[serde(default = "default_queue_capacity")] pub queue_capacity: usize,
}
fn default_queue_capacity() -> usize { 10_000 }

/// Mirror of the `[policy]` table
#[derive(Debug, Default, Deserialize)]
pub struct RawPolicy {
    #[serde(default)] pub block_processes: Vec<String>,
}

/// One `[[rules]]` entry; every criterion is optional
#[derive(Debug, Default, Deserialize)]
pub struct RawRule {
    #[serde(default)] pub protocol:       Option<String>,
    #[serde(default)] pub direction:      Option<String>,
    #[serde(default)] pub process_id:     Option<u32>,
    #[serde(default)] pub local_port:     Option<u16>,
    #[serde(default)] pub remote_port:    Option<u16>,
    #[serde(default)] pub local_address:  Option<String>,
    #[serde(default)] pub remote_address: Option<String>,
    #[serde(default)] pub to_head:        bool,
    #[serde(default)] pub action:         Vec<String>,
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid protocol '{0}'")]
    InvalidProtocol(String),

    #[error("invalid direction '{0}'")]
    InvalidDirection(String),

    #[error("invalid action '{0}'")]
    InvalidAction(String),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("rule #{index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: NfError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

// ───── string forms ─────────────────────────────────────────────────────────
// Newtypes because the enums live in `nfdriver`.

/// `"tcp"` / `"udp"` / `"any"`
pub struct ProtocolName(pub Protocol);

impl FromStr for ProtocolName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(ProtocolName(Protocol::Any)),
            "tcp" => Ok(ProtocolName(Protocol::Tcp)),
            "udp" => Ok(ProtocolName(Protocol::Udp)),
            other => Err(ConfigError::InvalidProtocol(other.into())),
        }
    }
}

/// `"in"` / `"out"` / `"both"`
pub struct DirectionName(pub Direction);

impl FromStr for DirectionName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in" => Ok(DirectionName(Direction::In)),
            "out" => Ok(DirectionName(Direction::Out)),
            "both" => Ok(DirectionName(Direction::Both)),
            other => Err(ConfigError::InvalidDirection(other.into())),
        }
    }
}

/// One entry of a rule's `action` list
pub struct ActionName(pub FilteringFlag);

impl FromStr for ActionName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let flag = match s.to_lowercase().as_str() {
            "allow" => FilteringFlag::ALLOW,
            "block" => FilteringFlag::BLOCK,
            "filter" => FilteringFlag::FILTER,
            "suspended" => FilteringFlag::SUSPENDED,
            "offline" => FilteringFlag::OFFLINE,
            "indicate_connect_requests" => FilteringFlag::INDICATE_CONNECT_REQUESTS,
            other => return Err(ConfigError::InvalidAction(other.into())),
        };
        Ok(ActionName(flag))
    }
}

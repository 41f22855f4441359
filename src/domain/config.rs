//! # Configuration
//!
//! Manages the loading and parsing of the application's configuration file (`config.yaml`).
//! Defines the structs for the chat service, the request engine limits, and system settings.
//! Every section has defaults, so a missing file still yields a usable engine for `run`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub postman: PostmanConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Like `load`, but falls back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Configuration for various connected services.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct ServicesConfig {
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
}

/// Specific configuration for the Matrix service.
#[derive(Debug, Deserialize, Clone)]
pub struct MatrixConfig {
    pub username: String,
    pub password: String,
    pub homeserver: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Limits and policies of the request engine. Injected into the engine at construction.
#[derive(Debug, Deserialize, Clone)]
pub struct PostmanConfig {
    /// Outbound requests allowed in flight at once, process-wide.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Per-attempt timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Overall deadline for one command, including time spent waiting for a permit.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_max_parameters")]
    pub max_parameters: usize,
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
    #[serde(default = "default_body_preview")]
    pub body_preview_bytes: usize,
    /// Hard cap on bytes read from a response body.
    #[serde(default = "default_max_response")]
    pub max_response_bytes: usize,
    /// Longest message the chat transport accepts; longer output is chunked.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Permit loopback and private-network targets. Development only.
    #[serde(default)]
    pub allow_private_targets: bool,
}

impl Default for PostmanConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            request_timeout_secs: default_request_timeout(),
            command_timeout_secs: default_command_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            max_parameters: default_max_parameters(),
            max_value_len: default_max_value_len(),
            body_preview_bytes: default_body_preview(),
            max_response_bytes: default_max_response(),
            max_message_len: default_max_message_len(),
            user_agent: default_user_agent(),
            allow_private_targets: false,
        }
    }
}

fn default_max_concurrent() -> usize {
    8
}
fn default_request_timeout() -> u64 {
    10
}
fn default_command_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base() -> u64 {
    250
}
fn default_backoff_max() -> u64 {
    2_000
}
fn default_max_parameters() -> usize {
    32
}
fn default_max_value_len() -> usize {
    1024
}
fn default_body_preview() -> usize {
    2000
}
fn default_max_response() -> usize {
    1024 * 1024
}
fn default_max_message_len() -> usize {
    4000
}
fn default_user_agent() -> String {
    concat!("postman-bot/", env!("CARGO_PKG_VERSION")).to_string()
}

/// System-level settings for the bot.
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Rooms whose messages are never handled (e.g. a tester room shared with a dev instance).
    #[serde(default)]
    pub ignored_rooms: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            log_dir: default_log_dir(),
            ignored_rooms: Vec::new(),
        }
    }
}

fn default_command_prefix() -> String {
    "!".to_string()
}
fn default_log_dir() -> String {
    "data".to_string()
}

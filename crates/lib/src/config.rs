//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.weft/config.json`) and environment.
//! Secrets (Slack bot token, Dify API key) may come from env instead of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Slack settings (bot token, API base, mention syntax).
    #[serde(default)]
    pub slack: SlackConfig,

    /// Dify backend settings (API key, app id, API base).
    #[serde(default)]
    pub dify: DifyConfig,

    /// Thread-session mapping settings.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Gateway bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook endpoint (default 15151).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15151
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Slack channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token (xoxb-...). Overridden by SLACK_BOT_TOKEN env when set.
    pub bot_token: Option<String>,

    /// Web API base URL (default "https://slack.com/api"; settable for tests).
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,

    /// Override for the leading-mention pattern stripped from message text.
    /// Default matches one leading `<@...>` token plus trailing whitespace.
    pub mention_pattern: Option<String>,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_slack_api_base(),
            mention_pattern: None,
        }
    }
}

/// Dify backend config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifyConfig {
    /// API key. Overridden by DIFY_API_KEY env when set.
    pub api_key: Option<String>,

    /// Application id sent as app_id on every chat-messages call.
    pub app_id: Option<String>,

    /// API base URL (default "https://api.dify.ai/v1"; settable for tests).
    #[serde(default = "default_dify_api_base")]
    pub api_base: String,
}

fn default_dify_api_base() -> String {
    "https://api.dify.ai/v1".to_string()
}

impl Default for DifyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            app_id: None,
            api_base: default_dify_api_base(),
        }
    }
}

/// Session mapping config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Time-to-live in seconds for a thread → conversation mapping (default 86400).
    /// After expiry the next message on the thread starts a fresh conversation.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    86400
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve the Slack bot token: env SLACK_BOT_TOKEN overrides config.
pub fn resolve_slack_token(config: &Config) -> Option<String> {
    std::env::var("SLACK_BOT_TOKEN")
        .ok()
        .and_then(non_empty)
        .or_else(|| config.slack.bot_token.clone().and_then(non_empty))
}

/// Resolve the Dify API key: env DIFY_API_KEY overrides config.
pub fn resolve_dify_key(config: &Config) -> Option<String> {
    std::env::var("DIFY_API_KEY")
        .ok()
        .and_then(non_empty)
        .or_else(|| config.dify.api_key.clone().and_then(non_empty))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WEFT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".weft").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or WEFT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

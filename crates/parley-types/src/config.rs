//! Configuration types for Parley.
//!
//! `ParleyConfig` is the top-level `config.toml`, split into one section per
//! process role: the tool bridge, the downstream user directory it calls, and
//! the chat API. Every field has a default, so an empty file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Settings for the tool bridge server (`/sse`, `/messages`, `/health`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_bridge_port")]
    pub port: u16,
    /// Path announced in the handshake for posting messages.
    #[serde(default = "default_post_endpoint")]
    pub post_endpoint: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Close sessions with no activity for this long. `0` disables expiry.
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Name reported in `initialize` responses.
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_bridge_port(),
            post_endpoint: default_post_endpoint(),
            heartbeat_secs: default_heartbeat_secs(),
            idle_timeout_secs: 0,
            server_name: default_server_name(),
        }
    }
}

/// Location of the downstream user directory API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub base_url: String,
    /// Overall deadline per directory call. `0` (the default) waits as long
    /// as the directory takes.
    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_url(),
            request_timeout_secs: 0,
        }
    }
}

/// Settings for the chat API server and its generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_chat_port")]
    pub port: u16,
    /// Streaming endpoint of the tool bridge.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Upper bound on generation steps per request (tool round trips + 1).
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Deadline for one request over a tool session. `0` (the default)
    /// waits for the bridge's answer.
    #[serde(default)]
    pub tool_call_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_chat_port(),
            bridge_url: default_bridge_url(),
            provider_base_url: default_provider_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: None,
            max_steps: default_max_steps(),
            system_prompt: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            tool_call_timeout_secs: 0,
        }
    }
}

impl ChatConfig {
    /// Per-request deadline for tool sessions, if one is configured.
    pub fn tool_call_timeout(&self) -> Option<Duration> {
        (self.tool_call_timeout_secs > 0).then(|| Duration::from_secs(self.tool_call_timeout_secs))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_bridge_port() -> u16 {
    3001
}

fn default_post_endpoint() -> String {
    "/messages".to_string()
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_server_name() -> String {
    "parley-bridge".to_string()
}

fn default_directory_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_chat_port() -> u16 {
    3002
}

fn default_bridge_url() -> String {
    "http://localhost:3001/sse".to_string()
}

fn default_provider_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "deepseek/deepseek-chat-v3-0324:free".to_string()
}

fn default_api_key_env() -> String {
    "OPEN_ROUTER_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_steps() -> u32 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

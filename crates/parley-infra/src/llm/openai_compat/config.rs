//! Configuration for OpenAI-compatible providers.

use std::time::Duration;

use parley_types::config::ChatConfig;
use secrecy::SecretString;

/// Default gateway: OpenRouter's OpenAI-compatible endpoint.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Configuration for an OpenAI-compatible LLM provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Name reported as `gen_ai.system` (e.g., "openrouter").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://openrouter.ai/api/v1").
    pub base_url: String,
    pub api_key: SecretString,
    pub connect_timeout: Duration,
}

impl OpenAiCompatConfig {
    /// Build from the `[chat]` section with an already-resolved key.
    pub fn from_chat_config(config: &ChatConfig, api_key: SecretString) -> Self {
        Self {
            provider_name: provider_name_for(&config.provider_base_url).to_string(),
            base_url: config.provider_base_url.clone(),
            api_key,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }
}

/// OpenRouter default configuration.
pub fn openrouter_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openrouter".into(),
        base_url: OPENROUTER_BASE_URL.into(),
        api_key,
        connect_timeout: Duration::from_secs(10),
    }
}

fn provider_name_for(base_url: &str) -> &'static str {
    if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("api.openai.com") {
        "openai"
    } else {
        "openai_compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openrouter_defaults() {
        let config = openrouter_defaults(SecretString::from("sk-or-test"));
        assert_eq!(config.provider_name, "openrouter");
        assert_eq!(config.base_url, OPENROUTER_BASE_URL);
    }

    #[test]
    fn test_from_chat_config_names_provider() {
        let chat = ChatConfig::default();
        let config = OpenAiCompatConfig::from_chat_config(&chat, SecretString::from("k"));
        assert_eq!(config.provider_name, "openrouter");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));

        let chat = ChatConfig {
            provider_base_url: "http://localhost:11434/v1".into(),
            ..ChatConfig::default()
        };
        let config = OpenAiCompatConfig::from_chat_config(&chat, SecretString::from("k"));
        assert_eq!(config.provider_name, "openai_compatible");
    }
}

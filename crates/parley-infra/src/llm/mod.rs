//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `parley-core`, and a factory ([`create_provider`]) that
//! builds it from the `[chat]` configuration.

pub mod openai_compat;

use std::sync::Arc;

use parley_core::llm::LlmProvider;
use parley_types::config::ChatConfig;
use parley_types::llm::LlmError;
use secrecy::SecretString;

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Create the chat provider from configuration.
///
/// `api_key` is the value of the variable named by `config.api_key_env`.
///
/// # Errors
///
/// [`LlmError::AuthenticationFailed`] if no (or an empty) key is provided.
pub fn create_provider(
    config: &ChatConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(LlmError::AuthenticationFailed)?;
    let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig::from_chat_config(
        config,
        SecretString::from(key),
    ))?;
    tracing::debug!(
        provider = provider.name(),
        base_url = %config.provider_base_url,
        "created LLM provider"
    );
    Ok(Arc::new(provider))
}

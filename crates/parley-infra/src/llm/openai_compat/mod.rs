//! OpenAI-compatible streaming LLM provider.
//!
//! One [`OpenAiCompatibleProvider`] serves OpenRouter (the default), OpenAI,
//! and any other gateway speaking `/chat/completions` with SSE streaming and
//! function tools.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building the `Authorization` header.

pub mod config;
pub mod streaming;
pub mod types;

use futures_util::StreamExt;
use parley_core::llm::{LlmProvider, LlmStream};
use parley_types::llm::{CompletionRequest, LlmError, Message, MessageRole};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};

use self::config::OpenAiCompatConfig;
use self::streaming::map_sse_response;
use self::types::{
    ApiErrorResponse, ChatMessage, ChatRequest, ChatTool, ChatToolCall, FunctionCall, FunctionDef,
    StreamOptions,
};

/// Unified provider for any OpenAI-compatible API.
///
/// Does NOT derive Debug: the struct holds the API key.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    provider_name: String,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        // No overall timeout: a streamed generation may run long.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            provider_name: config.provider_name,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build a [`ChatRequest`] from a generic [`CompletionRequest`].
    fn build_request(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: Some(system.clone()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.extend(request.messages.iter().map(to_chat_message));

        let tools = request
            .tools
            .iter()
            .map(|tool| ChatTool {
                kind: "function",
                function: FunctionDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect();

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
            tools,
        }
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };
    let content = if message.role == MessageRole::Assistant
        && message.content.is_empty()
        && !message.tool_calls.is_empty()
    {
        None
    } else {
        Some(message.content.clone())
    };
    let tool_calls = message
        .tool_calls
        .iter()
        .map(|call| ChatToolCall {
            id: call.id.clone(),
            kind: "function",
            function: FunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        })
        .collect();

    ChatMessage {
        role,
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// Send the request; a non-success status becomes an [`LlmError`].
async fn send(call: reqwest::RequestBuilder) -> Result<reqwest::Response, LlmError> {
    let response = call.send().await.map_err(|e| LlmError::Provider {
        message: format!("HTTP request failed: {e}"),
    })?;
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(map_error_response(response).await)
    }
}

/// Map a non-success HTTP response to an [`LlmError`].
async fn map_error_response(response: reqwest::Response) -> LlmError {
    let status = response.status();
    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000));
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthenticationFailed,
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited { retry_after_ms },
        StatusCode::BAD_REQUEST => LlmError::InvalidRequest(message),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn stream(&self, request: CompletionRequest) -> LlmStream {
        let body = self.build_request(&request);
        let call = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body);

        Box::pin(async_stream::try_stream! {
            let response = send(call).await?;
            let mut events = map_sse_response(response);
            while let Some(event) = events.next().await {
                yield event?;
            }
        })
    }
}

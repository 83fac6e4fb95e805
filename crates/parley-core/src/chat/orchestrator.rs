//! Chat streaming orchestrator.
//!
//! Per request: validate the conversation, open a transient tool session,
//! fetch its catalog, then stream generation. When a generation step ends
//! with tool calls, each call runs over the same session, the results are
//! appended to the conversation, and generation resumes, up to `max_steps`.
//!
//! Failures before streaming starts are returned as errors (with the session
//! already released). Once streaming has started, failures become a final
//! [`ChatEvent::Error`]. Every path releases the session through one
//! [`ReleaseHandle`], including the caller dropping the stream.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use parley_types::config::ChatConfig;
use parley_types::error::{ChatError, ToolSessionError};
use parley_types::llm::{
    CompletionRequest, Message, MessageRole, StopReason, StreamEvent, ToolCall, ToolSpec, Usage,
};
use parley_types::protocol::{CallToolResult, ContentBlock, ToolDefinition};
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn};

use super::release::{ReleaseHandle, ReleaseOnDrop, ReleaseTrigger};
use super::session::{ToolSession, ToolSessionConnector};
use crate::llm::{LlmProvider, StreamInSpan};

/// Generation settings applied to every request.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub max_steps: u32,
}

impl From<&ChatConfig> for ChatSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_steps: config.max_steps.max(1),
        }
    }
}

/// One item of a chat response stream, in generation order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta(String),
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: String,
        result: Value,
    },
    StepFinish {
        reason: StopReason,
        usage: Usage,
        is_continued: bool,
    },
    /// Last event of a successful stream.
    Finish {
        reason: StopReason,
        usage: Usage,
    },
    /// Last event of a failed stream.
    Error(String),
}

pub type ChatStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send + 'static>>;

pub struct ChatOrchestrator<C> {
    connector: Arc<C>,
    provider: Arc<dyn LlmProvider>,
    settings: Arc<ChatSettings>,
}

impl<C> Clone for ChatOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            provider: Arc::clone(&self.provider),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<C: ToolSessionConnector> ChatOrchestrator<C> {
    pub fn new(connector: Arc<C>, provider: Arc<dyn LlmProvider>, settings: ChatSettings) -> Self {
        Self {
            connector,
            provider,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Set up a chat request and return its event stream.
    ///
    /// No event is produced unless setup (session + catalog) succeeded.
    pub async fn start(&self, messages: Vec<Message>) -> Result<ChatStream, ChatError> {
        validate_messages(&messages)?;

        let session = self.connector.connect().await.map_err(|e| {
            error!(error = %e, "failed to open tool session");
            ChatError::from(e)
        })?;
        let release = ReleaseHandle::new(session);
        // Armed before the catalog fetch: a caller that hangs up while this
        // future is pending, or drops the response unread, still releases.
        let guard = release.release_on_drop();

        let tools = match release.session().list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                error!(session_id = release.session().id(), error = %e, "failed to fetch tool catalog");
                release.release(ReleaseTrigger::SetupFailed).await;
                return Err(e.into());
            }
        };
        info!(
            session_id = release.session().id(),
            tools = tools.len(),
            "tool catalog fetched"
        );

        Ok(Box::pin(self.clone().drive(release, guard, messages, tools)))
    }

    fn drive(
        self,
        release: ReleaseHandle<C::Session>,
        guard: ReleaseOnDrop<C::Session>,
        mut messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> impl Stream<Item = ChatEvent> + Send + 'static {
        let specs: Vec<ToolSpec> = tools.into_iter().map(tool_spec).collect();

        async_stream::stream! {
            let _guard = guard;
            let mut total = Usage::default();
            let mut step: u32 = 0;

            loop {
                step += 1;
                let mut events = self.generate(&messages, &specs, step);
                let mut text = String::new();
                let mut calls: Vec<ToolCall> = Vec::new();
                let mut reason = StopReason::Other;
                let mut usage = Usage::default();
                let mut failure = None;

                while let Some(event) = events.next().await {
                    match event {
                        Ok(StreamEvent::TextDelta { text: delta }) => {
                            text.push_str(&delta);
                            yield ChatEvent::TextDelta(delta);
                        }
                        Ok(StreamEvent::ToolUseComplete { id, name, input }) => {
                            yield ChatEvent::ToolCall {
                                id: id.clone(),
                                name: name.clone(),
                                arguments: input.clone(),
                            };
                            calls.push(ToolCall { id, name, arguments: input });
                        }
                        Ok(StreamEvent::MessageDelta { stop_reason }) => reason = stop_reason,
                        Ok(StreamEvent::Usage(u)) => usage = u,
                        Ok(StreamEvent::Connected) | Ok(StreamEvent::Done) => {}
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                drop(events);

                if let Some(e) = failure {
                    error!(step, error = %e, "generation failed");
                    yield ChatEvent::Error(e.to_string());
                    release.release(ReleaseTrigger::GenerationError).await;
                    return;
                }
                total.add(usage);

                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    let result = run_tool(release.session(), call).await;
                    results.push(Message::tool_result(call.id.clone(), result.text()));
                    yield ChatEvent::ToolResult {
                        id: call.id.clone(),
                        result: serde_json::to_value(&result).unwrap_or(Value::Null),
                    };
                }

                let is_continued = !calls.is_empty() && step < self.settings.max_steps;
                yield ChatEvent::StepFinish { reason, usage, is_continued };

                if !is_continued {
                    info!(
                        steps = step,
                        finish_reason = reason.finish_reason(),
                        input_tokens = total.input_tokens,
                        output_tokens = total.output_tokens,
                        "chat finished"
                    );
                    yield ChatEvent::Finish { reason, usage: total };
                    release.release(ReleaseTrigger::Finished).await;
                    return;
                }

                messages.push(Message::assistant(text, calls));
                messages.extend(results);
            }
        }
    }

    fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        step: u32,
    ) -> StreamInSpan<crate::llm::LlmStream> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            system: self.settings.system_prompt.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: true,
            tools: tools.to_vec(),
        };
        let span = info_span!(
            "gen_ai.stream",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = true,
            chat.step = step,
        );
        debug!(step, messages = messages.len(), "starting generation step");
        StreamInSpan::new(self.provider.stream(request), span)
    }
}

/// Roles a caller may send; tool turns are produced here, not accepted.
fn validate_messages(messages: &[Message]) -> Result<(), ChatError> {
    if messages.is_empty() {
        return Err(ChatError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }
    if let Some(pos) = messages.iter().position(|m| m.role == MessageRole::Tool) {
        return Err(ChatError::InvalidRequest(format!(
            "messages[{pos}]: role 'tool' is not accepted from callers"
        )));
    }
    Ok(())
}

fn tool_spec(tool: ToolDefinition) -> ToolSpec {
    ToolSpec {
        name: tool.name,
        description: tool.description,
        parameters: tool.input_schema,
    }
}

/// Run one tool call. Session failures become an error result so the model
/// can see them; they do not end the chat.
async fn run_tool<S: ToolSession>(session: &S, call: &ToolCall) -> CallToolResult {
    match session.call_tool(&call.name, call.arguments.clone()).await {
        Ok(result) => {
            debug!(tool = %call.name, is_error = result.is_error, "tool call returned");
            result
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "tool call failed");
            tool_failure(&e)
        }
    }
}

fn tool_failure(error: &ToolSessionError) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::Text {
            text: format!("Error: {error}"),
        }],
        is_error: true,
    }
}

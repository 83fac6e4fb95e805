//! LlmProvider trait definition.
//!
//! Only streaming is needed: every chat request streams tokens to its caller.
//! The stream is boxed so providers can be used as `Arc<dyn LlmProvider>`.

use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{CompletionRequest, LlmError, StreamEvent};

pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for generation backends.
///
/// Implementations live in parley-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name, reported as `gen_ai.system`.
    fn name(&self) -> &str;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Setup failures (bad credentials, unreachable endpoint) surface as the
    /// first item of the stream.
    fn stream(&self, request: CompletionRequest) -> LlmStream;
}

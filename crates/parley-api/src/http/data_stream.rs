//! Chat events encoded as the AI SDK data stream protocol (v1).
//!
//! One part per line, `<type>:<json>\n`:
//!
//! | code | part         |
//! |------|--------------|
//! | `0`  | text delta   |
//! | `9`  | tool call    |
//! | `a`  | tool result  |
//! | `e`  | step finish  |
//! | `d`  | finish       |
//! | `3`  | error        |

use serde_json::{Value, json};

use parley_core::chat::ChatEvent;
use parley_types::llm::Usage;

/// Response header announcing the protocol to clients.
pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

/// Encode one event as a complete line.
pub fn encode(event: &ChatEvent) -> String {
    let (code, payload) = match event {
        ChatEvent::TextDelta(text) => ('0', Value::String(text.clone())),
        ChatEvent::ToolCall {
            id,
            name,
            arguments,
        } => (
            '9',
            json!({ "toolCallId": id, "toolName": name, "args": arguments }),
        ),
        ChatEvent::ToolResult { id, result } => {
            ('a', json!({ "toolCallId": id, "result": result }))
        }
        ChatEvent::StepFinish {
            reason,
            usage,
            is_continued,
        } => (
            'e',
            json!({
                "finishReason": reason.finish_reason(),
                "usage": usage_json(usage),
                "isContinued": is_continued,
            }),
        ),
        ChatEvent::Finish { reason, usage } => (
            'd',
            json!({ "finishReason": reason.finish_reason(), "usage": usage_json(usage) }),
        ),
        ChatEvent::Error(message) => ('3', Value::String(message.clone())),
    };
    format!("{code}:{payload}\n")
}

fn usage_json(usage: &Usage) -> Value {
    json!({
        "promptTokens": usage.input_tokens,
        "completionTokens": usage.output_tokens,
    })
}

//! OpenAI SSE stream to [`StreamEvent`] adapter.
//!
//! Tool call arguments arrive as partial JSON fragments across multiple
//! streaming chunks (keyed by tool call index). These are accumulated and
//! emitted as [`StreamEvent::ToolUseComplete`] when a finish_reason is
//! received or the stream ends.

use std::collections::BTreeMap;

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use parley_core::llm::LlmStream;
use parley_types::llm::{LlmError, StopReason, StreamEvent, Usage};

use super::types::ChatChunk;

/// Terminal `data:` payload of an OpenAI stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates partial JSON fragments for a tool call during streaming.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    json_buffer: String,
}

/// Decodes chunk payloads into [`StreamEvent`]s.
#[derive(Default)]
pub struct StreamDecoder {
    // Ordered by index so completed calls are emitted in request order.
    tool_accumulators: BTreeMap<u32, ToolCallAccumulator>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode one `data:` payload.
    pub fn decode(&mut self, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
        let data = data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data == DONE_SENTINEL {
            self.done = true;
            let mut events = self.flush_tool_calls()?;
            events.push(StreamEvent::Done);
            return Ok(events);
        }

        let chunk: ChatChunk = serde_json::from_str(data)
            .map_err(|e| LlmError::Deserialization(format!("invalid stream chunk: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(LlmError::Provider {
                message: error.message,
            });
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::TextDelta { text });
            }

            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let acc = self.tool_accumulators.entry(tc.index).or_default();
                // Update id/name if provided in this chunk (first chunk has them)
                if let Some(id) = tc.id.filter(|id| !id.is_empty()) {
                    acc.id = id;
                }
                if let Some(function) = tc.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        acc.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        acc.json_buffer.push_str(&arguments);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                events.extend(self.flush_tool_calls()?);
                events.push(StreamEvent::MessageDelta {
                    stop_reason: map_finish_reason(&reason),
                });
            }
        }

        // Final chunk with `stream_options.include_usage`; choices are empty.
        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }));
        }

        Ok(events)
    }

    /// Events owed when the connection ends without `[DONE]`.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>, LlmError> {
        if self.done {
            return Ok(Vec::new());
        }
        self.done = true;
        let mut events = self.flush_tool_calls()?;
        events.push(StreamEvent::Done);
        Ok(events)
    }

    fn flush_tool_calls(&mut self) -> Result<Vec<StreamEvent>, LlmError> {
        std::mem::take(&mut self.tool_accumulators)
            .into_values()
            .map(|acc| {
                let input = if acc.json_buffer.trim().is_empty() {
                    serde_json::Value::Object(Default::default())
                } else {
                    serde_json::from_str(&acc.json_buffer).map_err(|e| {
                        LlmError::Deserialization(format!(
                            "tool call JSON for '{}': {e}",
                            acc.name
                        ))
                    })?
                };
                Ok(StreamEvent::ToolUseComplete {
                    id: acc.id,
                    name: acc.name,
                    input,
                })
            })
            .collect()
    }
}

pub fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::Other,
    }
}

/// Map a successful streaming response body to a stream of [`StreamEvent`]s.
///
/// The returned stream emits `Connected` first and `Done` last; a transport
/// or decode failure ends it with one `Err`.
pub fn map_sse_response(response: reqwest::Response) -> LlmStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        let mut decoder = StreamDecoder::new();
        let mut events = response.bytes_stream().eventsource();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
            for decoded in decoder.decode(&event.data)? {
                yield decoded;
            }
            if decoder.is_done() {
                break;
            }
        }

        for decoded in decoder.finish()? {
            yield decoded;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(decoder: &mut StreamDecoder, payloads: &[&str]) -> Vec<StreamEvent> {
        payloads
            .iter()
            .flat_map(|p| decoder.decode(p).unwrap())
            .collect()
    }

    #[test]
    fn test_text_deltas_and_finish() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(
            &mut decoder,
            &[
                r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
                r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":null}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#,
                "[DONE]",
            ],
        );

        assert!(matches!(&events[0], StreamEvent::TextDelta { text } if text == "Hel"));
        assert!(matches!(&events[1], StreamEvent::TextDelta { text } if text == "lo"));
        assert!(matches!(
            events[2],
            StreamEvent::MessageDelta { stop_reason: StopReason::EndTurn }
        ));
        assert!(matches!(
            events[3],
            StreamEvent::Usage(Usage { input_tokens: 12, output_tokens: 3 })
        ));
        assert!(matches!(events[4], StreamEvent::Done));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_tool_call_fragments_accumulate_by_index() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(
            &mut decoder,
            &[
                r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","type":"function","function":{"name":"deleteUser","arguments":""}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"getUser","arguments":"{\"id\":"}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":" \"u1\"}"}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"arguments":"{\"id\":\"u2\"}"}}]}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            ],
        );

        assert_eq!(events.len(), 3);
        match &events[0] {
            StreamEvent::ToolUseComplete { id, name, input } => {
                assert_eq!(id, "call_a");
                assert_eq!(name, "getUser");
                assert_eq!(input, &json!({ "id": "u1" }));
            }
            other => panic!("expected tool use, got {other:?}"),
        }
        assert!(matches!(&events[1], StreamEvent::ToolUseComplete { id, .. } if id == "call_b"));
        assert!(matches!(
            events[2],
            StreamEvent::MessageDelta { stop_reason: StopReason::ToolUse }
        ));
    }

    #[test]
    fn test_empty_arguments_parse_to_object() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(
            &mut decoder,
            &[
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"ping"}}]}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            ],
        );
        assert!(matches!(
            &events[0],
            StreamEvent::ToolUseComplete { input, .. } if input == &json!({})
        ));
    }

    #[test]
    fn test_malformed_tool_json_is_deserialization_error() {
        let mut decoder = StreamDecoder::new();
        decoder
            .decode(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"getUser","arguments":"{\"id\""}}]}}]}"#)
            .unwrap();
        let err = decoder
            .decode(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::Deserialization(msg) if msg.contains("getUser")));
    }

    #[test]
    fn test_error_chunk_is_provider_error() {
        let mut decoder = StreamDecoder::new();
        let err = decoder
            .decode(r#"{"error":{"message":"upstream overloaded","code":502}}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::Provider { message } if message == "upstream overloaded"));
    }

    #[test]
    fn test_garbage_chunk_is_deserialization_error() {
        let mut decoder = StreamDecoder::new();
        assert!(matches!(
            decoder.decode("{not json"),
            Err(LlmError::Deserialization(_))
        ));
    }

    #[test]
    fn test_finish_without_done_flushes_pending_calls() {
        let mut decoder = StreamDecoder::new();
        decoder
            .decode(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"getUser","arguments":"{}"}}]}}]}"#)
            .unwrap();
        let events = decoder.finish().unwrap();
        assert!(matches!(events[0], StreamEvent::ToolUseComplete { .. }));
        assert!(matches!(events[1], StreamEvent::Done));
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_finish_reason_mapping() {
        let cases = [
            ("stop", StopReason::EndTurn),
            ("length", StopReason::MaxTokens),
            ("tool_calls", StopReason::ToolUse),
            ("function_call", StopReason::ToolUse),
            ("content_filter", StopReason::ContentFilter),
            ("error", StopReason::Other),
        ];
        for (reason, expected) in cases {
            assert_eq!(map_finish_reason(reason), expected, "{reason}");
        }
    }
}

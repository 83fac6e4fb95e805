//! POST /api/chat
//!
//! Body: `{ "messages": [{ "role": "user", "content": "..." }, ...] }`.
//!
//! Streams the reply in the data stream protocol (see
//! [`data_stream`](crate::http::data_stream)). Failures before the first
//! byte (bad body, bridge unreachable, catalog fetch failed) answer with a
//! single JSON error instead. The transient tool session is released by the
//! stream itself, including when the caller hangs up mid-reply.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::HeaderName;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;

use parley_core::chat::ToolSessionConnector;
use parley_types::error::ChatError;
use parley_types::llm::Message;

use crate::http::data_stream::{self, DATA_STREAM_HEADER, DATA_STREAM_VERSION};
use crate::http::error::AppError;
use crate::state::ChatState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

pub async fn stream_chat<C: ToolSessionConnector>(
    State(state): State<ChatState<C>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ChatError::InvalidRequest(e.to_string()))?;

    let events = state.orchestrator.start(request.messages).await?;
    let body = Body::from_stream(
        events.map(|event| Ok::<_, Infallible>(data_stream::encode(&event))),
    );

    Ok((
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static(DATA_STREAM_HEADER), DATA_STREAM_VERSION),
        ],
        body,
    )
        .into_response())
}

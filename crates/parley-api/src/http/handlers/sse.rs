//! GET /sse
//!
//! Opens a streaming session. The first event is `endpoint`, whose data is
//! the URI to post messages to; protocol responses follow as `message`
//! events. Heartbeats are SSE comments so clients never see them as events.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::{Stream, StreamExt};

use parley_core::session::TransportEvent;

use crate::http::error::AppError;
use crate::state::BridgeState;

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

/// Stream ends when the session closes; the client dropping the response
/// aborts the session.
pub async fn open_stream(
    State(state): State<BridgeState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session = state.hub.open().await?;
    let events = session.into_stream().map(|event| Ok(to_sse_event(event)));
    Ok(Sse::new(events))
}

fn to_sse_event(event: TransportEvent) -> Event {
    match event {
        TransportEvent::Endpoint(handshake) => Event::default()
            .event(ENDPOINT_EVENT)
            .data(handshake.message_uri()),
        TransportEvent::Message(response) => {
            let data = serde_json::to_string(&response).unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to serialize protocol response");
                String::from("{}")
            });
            Event::default().event(MESSAGE_EVENT).data(data)
        }
        TransportEvent::Heartbeat => Event::default().comment("heartbeat"),
    }
}

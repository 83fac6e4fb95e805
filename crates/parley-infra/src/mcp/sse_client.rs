//! Client side of the bridge's streaming transport.
//!
//! [`SseToolConnector::connect`] opens `GET /sse`, waits for the `endpoint`
//! event, then runs the protocol handshake over the announced POST URI.
//! A listener task reads `message` events and completes the pending request
//! with the matching id. Closing (or dropping) the session cancels the
//! listener, which drops the stream connection so the bridge tears the
//! session down.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use parley_core::chat::{ToolSession, ToolSessionConnector};
use parley_types::error::ToolSessionError;
use parley_types::protocol::{
    CallToolParams, CallToolResult, Implementation, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION, ToolDefinition,
};
use reqwest::Url;
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

type EventStream =
    Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;
type Pending = Arc<DashMap<u64, oneshot::Sender<JsonRpcResponse>>>;

/// Opens [`SseToolSession`]s against one bridge.
pub struct SseToolConnector {
    client: reqwest::Client,
    sse_url: Url,
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
    client_info: Implementation,
}

impl SseToolConnector {
    pub fn new(
        bridge_url: &str,
        connect_timeout: Duration,
        request_timeout: Option<Duration>,
    ) -> Result<Self, ToolSessionError> {
        let sse_url = Url::parse(bridge_url)
            .map_err(|e| ToolSessionError::Connect(format!("invalid bridge url '{bridge_url}': {e}")))?;
        // No overall timeout on the client: the stream stays open for the
        // whole session. Per-request deadlines use `request_timeout`, when set.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ToolSessionError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            sse_url,
            connect_timeout,
            request_timeout,
            client_info: Implementation {
                name: "parley-chat".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    pub fn bridge_url(&self) -> &Url {
        &self.sse_url
    }

    async fn open_stream(&self) -> Result<(EventStream, Url, String), ToolSessionError> {
        let response = self
            .client
            .get(self.sse_url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ToolSessionError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolSessionError::Connect(format!(
                "{} returned {status}",
                self.sse_url
            )));
        }

        let mut events: EventStream = Box::pin(response.bytes_stream().eventsource());
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| ToolSessionError::Connect(e.to_string()))?;
            if event.event == ENDPOINT_EVENT {
                let (post_url, session_id) = resolve_endpoint(&self.sse_url, &event.data)?;
                return Ok((events, post_url, session_id));
            }
            debug!(event = %event.event, "ignoring event before handshake");
        }
        Err(ToolSessionError::Connect(
            "stream ended before the endpoint event".to_string(),
        ))
    }
}

/// Resolve the handshake's POST URI against the stream URL and pull out the
/// session id.
pub fn resolve_endpoint(sse_url: &Url, data: &str) -> Result<(Url, String), ToolSessionError> {
    let post_url = sse_url
        .join(data.trim())
        .map_err(|e| ToolSessionError::Protocol(format!("invalid endpoint '{data}': {e}")))?;
    let session_id = post_url
        .query_pairs()
        .find(|(key, _)| key == "sessionId")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ToolSessionError::Protocol(format!("endpoint '{data}' has no sessionId")))?;
    Ok((post_url, session_id))
}

impl ToolSessionConnector for SseToolConnector {
    type Session = SseToolSession;

    async fn connect(&self) -> Result<SseToolSession, ToolSessionError> {
        let (events, post_url, session_id) =
            tokio::time::timeout(self.connect_timeout, self.open_stream())
                .await
                .map_err(|_| {
                    ToolSessionError::Connect(format!(
                        "no endpoint event from {} within {:?}",
                        self.sse_url, self.connect_timeout
                    ))
                })??;

        let pending: Pending = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(listen(
            events,
            Arc::clone(&pending),
            cancel.clone(),
            session_id.clone(),
        ));

        let session = SseToolSession {
            id: session_id,
            client: self.client.clone(),
            post_url,
            pending,
            next_id: AtomicU64::new(1),
            cancel,
            listener: Mutex::new(Some(listener)),
            request_timeout: self.request_timeout,
        };

        // A failed handshake drops `session`, which cancels the listener.
        session.initialize(&self.client_info).await?;
        info!(session_id = %session.id, bridge = %self.sse_url, "tool session opened");
        Ok(session)
    }
}

/// Route `message` events to waiting requests until cancelled or the stream ends.
async fn listen(mut events: EventStream, pending: Pending, cancel: CancellationToken, session_id: String) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        match event {
            Some(Ok(event)) if event.event == MESSAGE_EVENT => {
                route_response(&pending, &event.data);
            }
            Some(Ok(event)) => debug!(session_id = %session_id, event = %event.event, "ignoring event"),
            Some(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "tool session stream failed");
                break;
            }
            None => {
                debug!(session_id = %session_id, "tool session stream ended");
                break;
            }
        }
    }
    // Waiters see their sender dropped and report the session closed.
    pending.clear();
    cancel.cancel();
}

/// Complete the pending request a response belongs to. Returns whether one matched.
fn route_response(pending: &DashMap<u64, oneshot::Sender<JsonRpcResponse>>, data: &str) -> bool {
    let response: JsonRpcResponse = match serde_json::from_str(data) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "undecodable message event");
            return false;
        }
    };
    let Some(id) = response.id.as_ref().and_then(Value::as_u64) else {
        debug!("message event without a numeric id");
        return false;
    };
    match pending.remove(&id) {
        Some((_, waiter)) => waiter.send(response).is_ok(),
        None => {
            debug!(id, "response for unknown request");
            false
        }
    }
}

/// An initialized session against a bridge.
pub struct SseToolSession {
    id: String,
    client: reqwest::Client,
    post_url: Url,
    pending: Pending,
    next_id: AtomicU64,
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Option<Duration>,
}

impl SseToolSession {
    pub fn post_url(&self) -> &Url {
        &self.post_url
    }

    async fn initialize(&self, client_info: &Implementation) -> Result<(), ToolSessionError> {
        let result = self
            .request(
                METHOD_INITIALIZE,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": client_info,
                }),
            )
            .await?;
        let version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if version != PROTOCOL_VERSION {
            warn!(session_id = %self.id, version, "bridge negotiated a different protocol version");
        }
        self.post(&JsonRpcRequest::notification(METHOD_INITIALIZED, None))
            .await
    }

    async fn post(&self, message: &JsonRpcRequest) -> Result<(), ToolSessionError> {
        let mut call = self.client.post(self.post_url.clone()).json(message);
        if let Some(timeout) = self.request_timeout {
            call = call.timeout(timeout);
        }
        let response = call
            .send()
            .await
            .map_err(|e| ToolSessionError::Protocol(format!("{} failed: {e}", message.method)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ToolSessionError::Protocol(format!(
            "{} rejected with {status}: {body}",
            message.method
        )))
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolSessionError> {
        if self.cancel.is_cancelled() {
            return Err(ToolSessionError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // The listener may have exited between the check above and the insert.
        if self.cancel.is_cancelled() {
            self.pending.remove(&id);
            return Err(ToolSessionError::Closed);
        }

        if let Err(e) = self
            .post(&JsonRpcRequest::new(id, method, Some(params)))
            .await
        {
            self.pending.remove(&id);
            return Err(e);
        }

        let answered = match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(answered) => answered,
                Err(_) => {
                    self.pending.remove(&id);
                    return Err(ToolSessionError::Protocol(format!(
                        "no response to {method} within {timeout:?}"
                    )));
                }
            },
            None => rx.await,
        };
        let Ok(response) = answered else {
            return Err(ToolSessionError::Closed);
        };

        if let Some(error) = response.error {
            return Err(ToolSessionError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

impl ToolSession for SseToolSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolSessionError> {
        let result = self.request(METHOD_TOOLS_LIST, json!({})).await?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ToolSessionError::Protocol(format!("invalid tools/list result: {e}")))?;
        Ok(list.tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ToolSessionError> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| ToolSessionError::Protocol(e.to_string()))?;
        let result = self.request(METHOD_TOOLS_CALL, params).await?;
        serde_json::from_value(result)
            .map_err(|e| ToolSessionError::Protocol(format!("invalid tools/call result: {e}")))
    }

    async fn close(&self) -> Result<(), ToolSessionError> {
        self.cancel.cancel();
        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                warn!(session_id = %self.id, error = %e, "tool session listener failed");
            }
        }
        debug!(session_id = %self.id, "tool session stream closed");
        Ok(())
    }
}

impl Drop for SseToolSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

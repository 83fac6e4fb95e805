//! One open streaming connection.
//!
//! State machine: `Connecting -> Active -> {Aborted, Closed}`. Every terminal
//! path (client disconnect, heartbeat exit, idle expiry, shutdown) funnels
//! into [`SessionTransport::release`], which is guarded by a compare-and-swap
//! on the status so only the first caller deregisters, cancels, and logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parley_types::error::TransportError;
use parley_types::protocol::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, error_codes,
};
use parley_types::session::{Handshake, SessionId, SessionSnapshot, SessionStatus};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handler::ProtocolHandler;
use super::registry::SessionRegistry;

/// An event written to the client over the push connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// First event: where to post messages for this session.
    Endpoint(Handshake),
    /// A protocol response.
    Message(JsonRpcResponse),
    /// Keep-alive for intermediaries; carries no payload.
    Heartbeat,
}

/// What happened to an inbound message after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A response was queued on the session's stream.
    Queued,
    /// The message was a notification; nothing to send.
    NoResponse,
    /// The session ended while the message was in flight; the result was dropped.
    Discarded,
}

/// A posted message after decoding.
#[derive(Debug)]
pub enum Inbound {
    Request(JsonRpcRequest),
    /// Valid JSON that is not a usable request. Answered with `-32600`.
    Invalid { id: Option<Value>, reason: String },
}

pub struct SessionTransport {
    id: SessionId,
    registry: SessionRegistry,
    handler: Arc<dyn ProtocolHandler>,
    outbound: mpsc::Sender<TransportEvent>,
    status: AtomicU8,
    created_at: DateTime<Utc>,
    last_heartbeat_ms: AtomicI64,
    /// Monotonic reference point for `last_activity_ms`.
    opened_at: Instant,
    last_activity_ms: AtomicU64,
    cancel: CancellationToken,
    /// Serializes dispatch so one session handles messages in arrival order.
    dispatch: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl SessionTransport {
    pub fn new(
        id: SessionId,
        registry: SessionRegistry,
        handler: Arc<dyn ProtocolHandler>,
        outbound: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            registry,
            handler,
            outbound,
            status: AtomicU8::new(SessionStatus::Connecting.as_u8()),
            created_at,
            last_heartbeat_ms: AtomicI64::new(created_at.timestamp_millis()),
            opened_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            dispatch: Arc::new(Mutex::new(())),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_heartbeat_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_heartbeat_ms.load(Ordering::Relaxed))
            .single()
            .unwrap_or(self.created_at)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            status: self.status(),
            created_at: self.created_at,
            last_heartbeat_at: self.last_heartbeat_at(),
        }
    }

    /// Token cancelled exactly when the session reaches a terminal state.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Emit the handshake and move `Connecting -> Active`.
    pub async fn activate(&self, post_endpoint: &str) -> Result<Handshake, TransportError> {
        let handshake = Handshake {
            session_id: self.id.clone(),
            post_endpoint: post_endpoint.to_string(),
        };
        self.send(TransportEvent::Endpoint(handshake.clone()))
            .await
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        self.status
            .compare_exchange(
                SessionStatus::Connecting.as_u8(),
                SessionStatus::Active.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| TransportError::Setup("session ended during handshake".to_string()))?;
        Ok(handshake)
    }

    /// Queue an event for the client.
    ///
    /// A dropped receiver means the client is gone; the session is aborted.
    pub async fn send(&self, event: TransportEvent) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        if self.outbound.send(event).await.is_err() {
            self.abort("client stream dropped");
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Parse a posted body. Only unparsable JSON is an error; anything else
    /// that is not a request is answered on the stream.
    pub fn decode(&self, body: &[u8]) -> Result<Inbound, TransportError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| TransportError::Malformed(e.to_string()))?;
        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => Ok(Inbound::Request(request)),
            Ok(request) => Ok(Inbound::Invalid {
                id: request.id,
                reason: format!("unsupported jsonrpc version '{}'", request.jsonrpc),
            }),
            Err(e) => Ok(Inbound::Invalid {
                id,
                reason: e.to_string(),
            }),
        }
    }

    /// Wait for this session's dispatch turn. Turns are granted in the order
    /// they are requested.
    pub async fn dispatch_turn(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.dispatch).lock_owned().await
    }

    /// Hand a decoded message to the protocol handler and queue its response.
    ///
    /// The handler always runs to completion; if the session ended meanwhile
    /// the response is discarded.
    pub async fn dispatch(&self, inbound: Inbound) -> Delivery {
        self.mark_activity();
        let response = match inbound {
            Inbound::Request(request) => {
                debug!(session_id = %self.id, method = %request.method, "dispatching message");
                self.handler.handle(&self.id, request).await
            }
            Inbound::Invalid { id, reason } => {
                warn!(session_id = %self.id, %reason, "invalid request");
                Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(
                        error_codes::INVALID_REQUEST,
                        format!("Invalid Request: {reason}"),
                    ),
                ))
            }
        };

        let Some(response) = response else {
            return Delivery::NoResponse;
        };
        match self.send(TransportEvent::Message(response)).await {
            Ok(()) => Delivery::Queued,
            Err(_) => {
                debug!(session_id = %self.id, "session ended; discarding result");
                Delivery::Discarded
            }
        }
    }

    /// Client disconnected.
    pub fn abort(&self, reason: &str) -> bool {
        self.release(SessionStatus::Aborted, reason)
    }

    /// Server-side teardown (heartbeat exit, idle expiry, shutdown).
    pub fn close(&self, reason: &str) -> bool {
        self.release(SessionStatus::Closed, reason)
    }

    /// Move to a terminal state, deregister, and stop the heartbeat.
    ///
    /// Only the first call has any effect; it returns `true`.
    pub fn release(&self, terminal: SessionStatus, reason: &str) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            if SessionStatus::from_u8(current).is_terminal() {
                return false;
            }
            match self.status.compare_exchange(
                current,
                terminal.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.registry.remove_transport(self);
        self.cancel.cancel();
        info!(session_id = %self.id, status = %terminal, reason, "session released");
        true
    }

    pub fn mark_heartbeat(&self) {
        self.last_heartbeat_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn mark_activity(&self) {
        let elapsed = Instant::now().duration_since(self.opened_at);
        self.last_activity_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Time since the last inbound message (or since open).
    pub fn idle_for(&self) -> Duration {
        let last = self.opened_at
            + Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        Instant::now().saturating_duration_since(last)
    }

    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

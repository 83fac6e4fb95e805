//! Entry point for opening streaming sessions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use parley_types::config::BridgeConfig;
use parley_types::error::TransportError;
use parley_types::session::{Handshake, SessionId};
use tokio::sync::mpsc;
use tracing::{error, info};

use super::handler::ProtocolHandler;
use super::heartbeat::run_heartbeat;
use super::registry::SessionRegistry;
use super::router::MessageRouter;
use super::transport::{SessionTransport, TransportEvent};

const OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub post_endpoint: String,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Option<Duration>,
    pub outbound_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for HubSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            post_endpoint: config.post_endpoint.clone(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_secs.max(1)),
            idle_timeout: (config.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(config.idle_timeout_secs)),
            outbound_capacity: OUTBOUND_CAPACITY,
        }
    }
}

/// Owns the session registry and opens sessions against one protocol handler.
#[derive(Clone)]
pub struct SessionHub {
    registry: SessionRegistry,
    handler: Arc<dyn ProtocolHandler>,
    settings: Arc<HubSettings>,
}

impl SessionHub {
    pub fn new(handler: Arc<dyn ProtocolHandler>, settings: HubSettings) -> Self {
        Self {
            registry: SessionRegistry::new(),
            handler,
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn router(&self) -> MessageRouter {
        MessageRouter::new(self.registry.clone())
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// Open a session: register it, emit the handshake, start its heartbeat.
    ///
    /// On failure the session is already deregistered; the caller should end
    /// the connection and let the client reconnect.
    pub async fn open(&self) -> Result<OpenSession, TransportError> {
        let (tx, rx) = mpsc::channel(self.settings.outbound_capacity.max(1));
        let transport = self
            .registry
            .register(|id| {
                Arc::new(SessionTransport::new(
                    id,
                    self.registry.clone(),
                    Arc::clone(&self.handler),
                    tx.clone(),
                ))
            })
            .map_err(|e| {
                error!(error = %e, "failed to register session");
                TransportError::Setup(e.to_string())
            })?;
        drop(tx);

        // From here on, dropping `session` aborts the transport.
        let mut session = OpenSession {
            transport: Arc::clone(&transport),
            events: rx,
            handshake: None,
        };
        let handshake = match transport.activate(&self.settings.post_endpoint).await {
            Ok(handshake) => handshake,
            Err(e) => {
                error!(session_id = %transport.id(), error = %e, "failed to establish session");
                return Err(e);
            }
        };

        tokio::spawn(run_heartbeat(
            Arc::clone(&transport),
            self.settings.heartbeat_interval,
            self.settings.idle_timeout,
        ));
        info!(session_id = %transport.id(), "session opened");

        session.handshake = Some(handshake);
        Ok(session)
    }

    /// Close every open session.
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.close_all("server shutting down");
        if closed > 0 {
            info!(closed, "closed open sessions");
        }
        closed
    }
}

/// The server side of one open session: its outbound events.
///
/// Dropping it (the client went away) aborts the session.
pub struct OpenSession {
    transport: Arc<SessionTransport>,
    events: mpsc::Receiver<TransportEvent>,
    handshake: Option<Handshake>,
}

impl OpenSession {
    pub fn id(&self) -> &SessionId {
        self.transport.id()
    }

    pub fn transport(&self) -> &Arc<SessionTransport> {
        &self.transport
    }

    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    /// Next event to write, or `None` once the session has ended.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let cancel = self.transport.cancellation();
        tokio::select! {
            biased;
            event = self.events.recv() => event,
            _ = cancel.cancelled() => None,
        }
    }

    pub fn into_stream(mut self) -> impl Stream<Item = TransportEvent> + Send + 'static {
        async_stream::stream! {
            while let Some(event) = self.next_event().await {
                yield event;
            }
        }
    }
}

impl Drop for OpenSession {
    fn drop(&mut self) {
        self.transport.abort("client disconnected");
    }
}

//! Delivers posted messages to the session they name.
//!
//! Stale ids are the normal way clients learn a session is gone, so they are
//! reported as client errors. Dispatch runs on its own task: a panicking
//! handler surfaces as [`RouteError::Internal`] instead of taking the
//! server down, and a caller that stops waiting does not cancel the handler.

use parley_types::error::{RouteError, TransportError};
use tracing::{error, warn};

use super::registry::SessionRegistry;
use super::transport::Delivery;

#[derive(Clone)]
pub struct MessageRouter {
    registry: SessionRegistry,
}

impl MessageRouter {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub async fn route(&self, session_id: Option<&str>, body: &[u8]) -> Result<Delivery, RouteError> {
        let Some(session_id) = session_id.filter(|id| !id.is_empty()) else {
            warn!("message posted without a session id");
            return Err(RouteError::MissingSessionId);
        };

        let Some(transport) = self.registry.lookup(session_id) else {
            warn!(session_id, "no transport found for session");
            return Err(RouteError::UnknownSession(session_id.to_string()));
        };

        let inbound = transport.decode(body).map_err(|e| {
            warn!(session_id, error = %e, "rejected posted message");
            match e {
                TransportError::Malformed(reason) => RouteError::Malformed(reason),
                other => RouteError::Internal(other.to_string()),
            }
        })?;

        // Take the turn before spawning so arrival order is dispatch order.
        let turn = transport.dispatch_turn().await;
        let task = tokio::spawn(async move {
            let _turn = turn;
            transport.dispatch(inbound).await
        });

        match task.await {
            Ok(delivery) => Ok(delivery),
            Err(e) => {
                error!(session_id, error = %e, "message handler failed");
                Err(RouteError::Internal(e.to_string()))
            }
        }
    }
}

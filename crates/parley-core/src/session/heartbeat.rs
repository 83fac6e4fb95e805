//! Periodic keep-alive for one streaming session.
//!
//! The task sleeps for the heartbeat interval, then checks that the session is
//! still registered (closing it if not), applies the optional idle limit, and
//! writes a heartbeat event. It stops as soon as the session's cancellation
//! token fires, which happens exactly when the session turns terminal.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::transport::{SessionTransport, TransportEvent};

/// Why the heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// The session was released elsewhere.
    Cancelled,
    /// The registry no longer maps the id to this session.
    Deregistered,
    /// No inbound message within the idle limit.
    IdleExpired,
    /// The heartbeat could not be written.
    SendFailed,
}

pub async fn run_heartbeat(
    transport: Arc<SessionTransport>,
    interval: Duration,
    idle_timeout: Option<Duration>,
) -> HeartbeatExit {
    let cancel = transport.cancellation();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(session_id = %transport.id(), "heartbeat stopped");
                return HeartbeatExit::Cancelled;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        if !transport.registry().holds(&transport) {
            transport.close("session no longer registered");
            return HeartbeatExit::Deregistered;
        }

        if let Some(limit) = idle_timeout {
            if transport.idle_for() >= limit {
                transport.close("idle timeout");
                return HeartbeatExit::IdleExpired;
            }
        }

        if transport.send(TransportEvent::Heartbeat).await.is_err() {
            return HeartbeatExit::SendFailed;
        }
        transport.mark_heartbeat();
    }
}

//! Streaming sessions: registry, per-connection transport, heartbeat, and the
//! router that delivers posted messages to the right session.

pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod registry;
pub mod router;
pub mod transport;

pub use handler::ProtocolHandler;
pub use hub::{HubSettings, OpenSession, SessionHub};
pub use registry::SessionRegistry;
pub use router::MessageRouter;
pub use transport::{Delivery, SessionTransport, TransportEvent};
